/// Message intent classifier
/// Decides whether an incoming message is plain conversation, a command
/// aimed at the project/task features, or too mixed to route safely.
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Free conversation, answered from chat memory.
    GeneralChat,

    /// A command for the application features.
    /// Examples: "crée un projet Alpha", "delete the second task"
    ActionCommand,

    /// Empty input or mixed signals; ask the user to clarify.
    Ambiguous,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub decision: RouteDecision,
    pub confidence: f32,
}

pub struct MessageClassifier;

impl MessageClassifier {
    /// Classify a message based on keyword pattern matching.
    pub fn classify(message: &str) -> Classification {
        let text = message.trim().to_lowercase();

        if text.is_empty() {
            debug!("Empty message, classified Ambiguous");
            return Classification {
                decision: RouteDecision::Ambiguous,
                confidence: 1.0,
            };
        }

        // Imperative command verbs and command phrases (French + English)
        let action_patterns = [
            "crée",
            "créer",
            "ajoute",
            "supprime",
            "supprimer",
            "efface",
            "termine l",
            "marque",
            "modifie",
            "renomme",
            "déplace",
            "archive l",
            "liste les",
            "liste mes",
            "affiche les",
            "affiche mes",
            "montre les",
            "montre mes",
            "sélectionne",
            "filtre les",
            "filtre par",
            "create a",
            "create the",
            "add a task",
            "add a project",
            "new task",
            "new project",
            "delete",
            "remove the",
            "update the",
            "rename",
            "complete the",
            "finish the",
            "mark as",
            "list my",
            "list the",
            "list all",
            "show me",
            "show all",
            "select",
            "filter by",
        ];

        // Conversation markers: questions, smalltalk, explanation requests
        let chat_patterns = [
            "pourquoi",
            "comment",
            "qu'est-ce",
            "quelle est",
            "quel est",
            "c'est quoi",
            "explique",
            "que penses-tu",
            "aide-moi à comprendre",
            "bonjour",
            "salut",
            "merci",
            "why",
            "how do",
            "how does",
            "what is",
            "what are",
            "explain",
            "tell me about",
            "what do you think",
            "help me understand",
            "hello",
            "thanks",
            "thank you",
        ];

        let action_hits = action_patterns.iter().filter(|p| text.contains(*p)).count();
        let mut chat_hits = chat_patterns.iter().filter(|p| text.contains(*p)).count();

        // A trailing question mark reads as conversation.
        if text.ends_with('?') {
            chat_hits += 1;
        }

        // A message that opens with a command verb is a strong action signal.
        let leading_imperative = action_patterns
            .iter()
            .any(|p| text.starts_with(*p));

        match (action_hits, chat_hits) {
            (0, 0) => {
                debug!("No signals, defaulting to GeneralChat");
                Classification {
                    decision: RouteDecision::GeneralChat,
                    confidence: 0.5,
                }
            }
            (a, 0) => {
                let mut confidence = 0.7 + 0.1 * (a.min(3) as f32 - 1.0);
                if leading_imperative {
                    confidence += 0.1;
                }
                debug!("Detected ActionCommand ({} pattern hits)", a);
                Classification {
                    decision: RouteDecision::ActionCommand,
                    confidence: confidence.min(0.95),
                }
            }
            (0, c) => {
                let confidence = (0.7 + 0.1 * (c.min(3) as f32 - 1.0)).min(0.95);
                debug!("Detected GeneralChat ({} pattern hits)", c);
                Classification {
                    decision: RouteDecision::GeneralChat,
                    confidence,
                }
            }
            (a, c) => {
                debug!("Mixed signals (action: {}, chat: {}), classified Ambiguous", a, c);
                Classification {
                    decision: RouteDecision::Ambiguous,
                    confidence: 0.5,
                }
            }
        }
    }

    /// Check if a message should go to the command router.
    pub fn is_actionable(message: &str) -> bool {
        Self::classify(message).decision == RouteDecision::ActionCommand
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_command_french() {
        let c = MessageClassifier::classify("Crée un nouveau projet nommé Alpha");
        assert_eq!(c.decision, RouteDecision::ActionCommand);
        assert!(c.confidence >= 0.7);
    }

    #[test]
    fn test_action_command_english() {
        let c = MessageClassifier::classify("delete the second task");
        assert_eq!(c.decision, RouteDecision::ActionCommand);
    }

    #[test]
    fn test_general_chat_question() {
        let c = MessageClassifier::classify("Pourquoi le ciel est bleu ?");
        assert_eq!(c.decision, RouteDecision::GeneralChat);
        assert!(c.confidence >= 0.7);
    }

    #[test]
    fn test_smalltalk_is_chat() {
        let c = MessageClassifier::classify("Bonjour, merci pour hier");
        assert_eq!(c.decision, RouteDecision::GeneralChat);
    }

    #[test]
    fn test_no_signal_defaults_to_chat_with_low_confidence() {
        let c = MessageClassifier::classify("d'accord");
        assert_eq!(c.decision, RouteDecision::GeneralChat);
        assert!(c.confidence <= 0.5);
    }

    #[test]
    fn test_empty_message_is_ambiguous() {
        let c = MessageClassifier::classify("   ");
        assert_eq!(c.decision, RouteDecision::Ambiguous);
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn test_mixed_signals_are_ambiguous() {
        let c = MessageClassifier::classify(
            "Liste mes tâches et explique pourquoi tu les as triées comme ça",
        );
        assert_eq!(c.decision, RouteDecision::Ambiguous);
    }

    #[test]
    fn test_leading_imperative_raises_confidence() {
        let leading = MessageClassifier::classify("supprime le projet Alpha");
        let embedded = MessageClassifier::classify("il faudrait que tu supprime le projet Alpha");
        assert_eq!(leading.decision, RouteDecision::ActionCommand);
        assert_eq!(embedded.decision, RouteDecision::ActionCommand);
        assert!(leading.confidence > embedded.confidence);
    }

    #[test]
    fn test_is_actionable() {
        assert!(MessageClassifier::is_actionable("liste mes projets"));
        assert!(!MessageClassifier::is_actionable("bonjour"));
    }
}
