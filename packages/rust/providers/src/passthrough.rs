//! Condenser used when no chat model is configured.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use deepresearch_shared::ProviderError;

use crate::Condenser;

/// Returns its input unchanged and counts calls.
#[derive(Debug, Default)]
pub struct IdentityCondenser {
    calls: AtomicUsize,
}

impl IdentityCondenser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Condenser for IdentityCondenser {
    async fn condense(&self, text: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(text.to_string())
    }

    fn name(&self) -> &str {
        "identity"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_input_and_counts() {
        let condenser = IdentityCondenser::new();
        assert_eq!(condenser.condense("Ethics: s").await.unwrap(), "Ethics: s");
        assert_eq!(condenser.condense("").await.unwrap(), "");
        assert_eq!(condenser.calls(), 2);
    }
}
