/// Raw lines that never became records, kept in arrival order for later
/// inspection. Append-only; nothing here is fed back into parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RejectionLedger {
    entries: Vec<String>,
}

impl RejectionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, raw: impl Into<String>) {
        self.entries.push(raw.into());
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
