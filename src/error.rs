use color_eyre::eyre::Report;
use std::sync::Arc;
use thiserror::Error;

/// Consecutive fetch failures after which automatic triggers stop calling the fetcher.
pub const MAX_ATTEMPTS: u32 = 3;

/// Errors surfaced through a query's state. They are never returned from triggers.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
  /// The fetcher failed.
  #[error("{0}")]
  Fetcher(Arc<Report>),

  /// The attempt cap was reached and the fetcher was not called.
  #[error("Failed after {attempts} attempts")]
  Exhausted { attempts: u32 },
}

impl FetchError {
  pub(crate) fn exhausted() -> Self {
    Self::Exhausted {
      attempts: MAX_ATTEMPTS,
    }
  }

  pub fn message(&self) -> String {
    self.to_string()
  }

  pub fn is_exhausted(&self) -> bool {
    matches!(self, Self::Exhausted { .. })
  }

  /// The fetcher's report, including its cause chain.
  pub fn report(&self) -> Option<&Report> {
    match self {
      Self::Fetcher(report) => Some(report),
      Self::Exhausted { .. } => None,
    }
  }
}

impl From<Report> for FetchError {
  fn from(report: Report) -> Self {
    Self::Fetcher(Arc::new(report))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::eyre::{eyre, WrapErr};

  #[test]
  fn test_exhausted_message() {
    let error = FetchError::exhausted();
    assert_eq!(error.message(), "Failed after 3 attempts");
    assert!(error.is_exhausted());
    assert!(error.report().is_none());
  }

  #[test]
  fn test_fetcher_error_keeps_report() {
    let report = Err::<(), _>(eyre!("connection reset"))
      .wrap_err("Failed to load todos")
      .unwrap_err();
    let error = FetchError::from(report);

    assert_eq!(error.message(), "Failed to load todos");
    assert!(!error.is_exhausted());
    let chain: Vec<String> = error
      .report()
      .map(|r| r.chain().map(|c| c.to_string()).collect())
      .unwrap_or_default();
    assert_eq!(chain, vec!["Failed to load todos", "connection reset"]);
  }
}
