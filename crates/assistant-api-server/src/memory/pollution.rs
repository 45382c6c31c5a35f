//! Detection of action-result shapes inside chat text.
//!
//! Command handlers format their confirmations ("J'ai trouvé 3 projet(s)",
//! entity listings, JSON dumps). Those strings must never be replayed to the
//! model as conversation, so inserts into chat history are screened here.
//!
//! Rule contract, by tier:
//! - Strict (assistant/system authored): any counted-result phrase, JSON
//!   carrying entity fields, entity bullet listing or markdown table is
//!   rejected.
//! - Light (user authored): only obvious injected dumps are rejected, either
//!   a message that IS a result line (counted-result phrase at the start,
//!   not phrased as a question), a pasted JSON entity dump, or a pasted
//!   entity listing. Users talking ABOUT results keep their messages.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::chat::Role;

/// How aggressively to screen, depending on who authored the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterTier {
    Strict,
    Light,
}

/// Assistant and system text gets the strict screen, user text the light one.
pub fn tier_for_role(role: Role) -> FilterTier {
    match role {
        Role::User => FilterTier::Light,
        Role::Assistant | Role::System => FilterTier::Strict,
    }
}

// "J'ai trouvé 3 ...", "j'ai supprimé 2 ..." (both apostrophe forms)
static COUNTED_RESULT_FR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bj['’]ai\s+(trouvé|trouve|créé|cree|ajouté|ajoute|supprimé|supprime|terminé|termine|modifié|modifie|mis\s+à\s+jour)\s+\d+\s+\S+",
    )
    .unwrap()
});

// "Found 3 tasks", "Deleted 2 projects"
static COUNTED_RESULT_EN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(found|created|added|updated|deleted|removed|completed)\s+\d+\s+(projects?|tasks?|items?|results?|records?|entries|projets?|tâches?)\b",
    )
    .unwrap()
});

// The "(s)" pluralization marker of templated result lines: "3 projet(s)"
static PLURAL_TEMPLATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\s+\w+\(s\)").unwrap());

// Entity-ish JSON fields, e.g. {"id": 12, "name": "Alpha", "status": "done"}
static JSON_ENTITY_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(id|name|title|status|project_id|task_id|due_date)"\s*:"#).unwrap());

// Bullet lines carrying an entity marker: "- Alpha (id: 42)" or "- Tâche #7"
static BULLET_ENTITY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*[-•*]\s+.*(\(id\s*:?\s*[\w-]+\)|#\d+)").unwrap()
});

// Markdown table separator row
static TABLE_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*\|?\s*:?-{3,}\s*\|").unwrap());

/// Screen `text` as a chat-history candidate. Returns the matched rule name
/// when the text looks like action output and must be kept out of history.
pub fn detect(text: &str, tier: FilterTier) -> Option<&'static str> {
    match tier {
        FilterTier::Strict => detect_strict(text),
        FilterTier::Light => detect_light(text),
    }
}

fn detect_strict(text: &str) -> Option<&'static str> {
    if COUNTED_RESULT_FR.is_match(text)
        || COUNTED_RESULT_EN.is_match(text)
        || PLURAL_TEMPLATE.is_match(text)
    {
        return Some("counted-result-phrase");
    }
    if has_json_entity_block(text) {
        return Some("json-entity-dump");
    }
    if BULLET_ENTITY_LINE.find_iter(text).count() >= 2 {
        return Some("entity-listing");
    }
    if TABLE_SEPARATOR.is_match(text) {
        return Some("table-listing");
    }
    None
}

fn detect_light(text: &str) -> Option<&'static str> {
    let trimmed = text.trim();

    // A pasted raw result object or array.
    if (trimmed.starts_with('{') || trimmed.starts_with('[')) && JSON_ENTITY_FIELD.is_match(trimmed)
    {
        return Some("json-entity-dump");
    }

    // The message IS a result line, not a question about one.
    let is_result_line = |m: Option<regex::Match<'_>>| {
        m.map(|m| m.start() == 0).unwrap_or(false) && !trimmed.contains('?')
    };
    if is_result_line(COUNTED_RESULT_FR.find(trimmed))
        || is_result_line(COUNTED_RESULT_EN.find(trimmed))
    {
        return Some("counted-result-phrase");
    }

    // A pasted multi-entity listing.
    if BULLET_ENTITY_LINE.find_iter(trimmed).count() >= 2 {
        return Some("entity-listing");
    }

    None
}

fn has_json_entity_block(text: &str) -> bool {
    (text.contains('{') || text.contains('[')) && JSON_ENTITY_FIELD.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_blocks_french_counted_result() {
        let text = "J'ai trouvé 3 projet(s) correspondant à votre recherche.";
        assert_eq!(detect(text, FilterTier::Strict), Some("counted-result-phrase"));
    }

    #[test]
    fn test_strict_blocks_english_counted_result() {
        assert!(detect("Deleted 2 tasks from the backlog.", FilterTier::Strict).is_some());
    }

    #[test]
    fn test_strict_blocks_plural_template() {
        assert!(detect("Résultat : 5 tâche(s) en retard", FilterTier::Strict).is_some());
    }

    #[test]
    fn test_strict_blocks_json_dump() {
        let text = r#"Voici le résultat: {"id": 12, "name": "Alpha", "status": "done"}"#;
        assert_eq!(detect(text, FilterTier::Strict), Some("json-entity-dump"));
    }

    #[test]
    fn test_strict_blocks_entity_listing() {
        let text = "Vos projets :\n- Alpha (id: 42)\n- Beta (id: 43)";
        assert_eq!(detect(text, FilterTier::Strict), Some("entity-listing"));
    }

    #[test]
    fn test_strict_blocks_markdown_table() {
        let text = "| nom | statut |\n|-----|--------|\n| Alpha | actif |";
        assert_eq!(detect(text, FilterTier::Strict), Some("table-listing"));
    }

    #[test]
    fn test_strict_accepts_normal_answer() {
        let text = "La gestion de projet consiste à organiser le travail en étapes.";
        assert_eq!(detect(text, FilterTier::Strict), None);
    }

    #[test]
    fn test_light_accepts_question_about_result() {
        // Same phrase, but the user is asking about it.
        let text = "Pourquoi as-tu dit « J'ai trouvé 3 projet(s) » hier ?";
        assert_eq!(detect(text, FilterTier::Light), None);
    }

    #[test]
    fn test_light_blocks_verbatim_result_line() {
        let text = "J'ai trouvé 3 projet(s) : Alpha, Beta, Gamma";
        assert_eq!(detect(text, FilterTier::Light), Some("counted-result-phrase"));
    }

    #[test]
    fn test_light_blocks_pasted_json() {
        let text = r#"{"id": 7, "title": "Refonte", "status": "todo"}"#;
        assert_eq!(detect(text, FilterTier::Light), Some("json-entity-dump"));
    }

    #[test]
    fn test_light_accepts_technical_discussion() {
        let text = "Est-ce que le champ \"status\" peut valoir archived ?";
        assert_eq!(detect(text, FilterTier::Light), None);
    }

    #[test]
    fn test_light_accepts_plain_chat() {
        assert_eq!(detect("Bonjour, peux-tu m'aider ?", FilterTier::Light), None);
    }

    #[test]
    fn test_asymmetry_same_text_both_tiers() {
        // Embedded mention: polluting for the assistant, fine for the user.
        let text = "D'accord, j'ai trouvé 3 résultats pour toi";
        assert!(detect(text, FilterTier::Strict).is_some());
        assert_eq!(detect(text, FilterTier::Light), None);
    }

    #[test]
    fn test_tier_for_role() {
        assert_eq!(tier_for_role(Role::User), FilterTier::Light);
        assert_eq!(tier_for_role(Role::Assistant), FilterTier::Strict);
        assert_eq!(tier_for_role(Role::System), FilterTier::Strict);
    }
}
