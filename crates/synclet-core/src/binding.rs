//! One-shot ownership slot for connectors and transports.

use std::sync::OnceLock;

use crate::error::{CoreError, Result};

/// Records which synclet a component belongs to.
///
/// A component can be bound exactly once; a second bind is a programming
/// error and fails loudly.
#[derive(Debug, Default)]
pub struct Binding {
    owner: OnceLock<String>,
}

impl Binding {
    pub const fn new() -> Self {
        Self {
            owner: OnceLock::new(),
        }
    }

    /// Bind to the synclet with the given id.
    pub fn bind(&self, kind: &'static str, owner: &str) -> Result<()> {
        self.owner
            .set(owner.to_owned())
            .map_err(|_| CoreError::AlreadyBound {
                kind,
                owner: self.owner().unwrap_or_default().to_owned(),
            })
    }

    /// Id of the owning synclet, if bound.
    pub fn owner(&self) -> Option<&str> {
        self.owner.get().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_bind_fails() {
        let binding = Binding::new();
        assert_eq!(binding.owner(), None);

        binding.bind("data connector", "a").unwrap();
        assert_eq!(binding.owner(), Some("a"));

        let err = binding.bind("data connector", "b").unwrap_err();
        assert!(matches!(err, CoreError::AlreadyBound { ref owner, .. } if owner == "a"));
        assert_eq!(binding.owner(), Some("a"));
    }
}
