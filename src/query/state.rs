use serde::Serialize;

use crate::error::FetchError;

/// Where a query stands in its fetch lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
  /// Nothing to show and nothing in flight
  Idle,
  /// A fetch is in flight
  Fetching,
  /// Data is available, from the cache or the last fetch
  Success,
  /// The last fetch failed
  Failed,
  /// The attempt cap was reached; automatic triggers no longer call the fetcher
  Exhausted,
}

/// Snapshot of a query's observable state.
#[derive(Debug, Clone)]
pub struct QueryState<T> {
  pub data: Option<T>,
  /// True until the first fetch settles, unless the query started from cached data
  pub is_loading: bool,
  pub is_fetching: bool,
  pub error: Option<FetchError>,
}

impl<T> QueryState<T> {
  pub(crate) fn seeded(data: Option<T>) -> Self {
    Self {
      is_loading: data.is_none(),
      data,
      is_fetching: false,
      error: None,
    }
  }

  pub fn status(&self) -> QueryStatus {
    match (&self.error, &self.data) {
      (Some(error), _) if error.is_exhausted() => QueryStatus::Exhausted,
      _ if self.is_fetching => QueryStatus::Fetching,
      (Some(_), _) => QueryStatus::Failed,
      (None, Some(_)) => QueryStatus::Success,
      (None, None) => QueryStatus::Idle,
    }
  }

  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  pub fn error(&self) -> Option<&FetchError> {
    self.error.as_ref()
  }

  pub fn is_success(&self) -> bool {
    self.status() == QueryStatus::Success
  }

  pub fn is_error(&self) -> bool {
    self.error.is_some()
  }

  /// No fetch in flight and either data or an error to show.
  pub fn is_settled(&self) -> bool {
    !self.is_fetching && (self.data.is_some() || self.error.is_some())
  }
}
