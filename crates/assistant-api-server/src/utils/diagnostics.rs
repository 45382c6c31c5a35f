/// Invariant reporting with a configurable strictness switch.
///
/// Violations are always logged. In strict mode (tests, staging) they
/// additionally panic so a broken assumption fails fast instead of being
/// silently coerced away in production traffic.
#[derive(Debug, Clone, Copy)]
pub struct Diagnostics {
    strict: bool,
}

impl Diagnostics {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Report a violated invariant. `scope` names the subsystem, `detail`
    /// describes what was observed.
    pub fn invariant_violation(&self, scope: &str, detail: &str) {
        tracing::error!(target: "invariant", scope = scope, detail = detail, "invariant violated");

        if self.strict {
            panic!("invariant violated in {}: {}", scope, detail);
        }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self { strict: false }
    }
}
