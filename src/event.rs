use qfetch::QueryState;
use serde_json::Value;
use tokio::sync::{mpsc, watch};

/// Application events
#[derive(Debug)]
pub enum Event {
  /// A watched query changed state
  Update {
    name: String,
    state: QueryState<Value>,
  },
  /// Ctrl-C was pressed
  Interrupt,
}

/// Event handler that merges query updates and the interrupt signal into one stream
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // Spawn interrupt listener
    let interrupt_tx = tx.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        let _ = interrupt_tx.send(Event::Interrupt);
      }
    });

    Self { tx, rx }
  }

  /// Forward the states of `updates`, starting with the current one.
  ///
  /// The watch channel keeps only the latest state, so states replaced before this task
  /// runs again (such as a failure followed at once by its retry) are not forwarded.
  pub fn watch(&self, name: String, mut updates: watch::Receiver<QueryState<Value>>) {
    let tx = self.tx.clone();

    tokio::spawn(async move {
      loop {
        let state = updates.borrow_and_update().clone();
        if tx
          .send(Event::Update {
            name: name.clone(),
            state,
          })
          .is_err()
        {
          break;
        }
        // Sender dropped: the query is gone
        if updates.changed().await.is_err() {
          break;
        }
      }
    });
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use qfetch::{Query, QueryCache, QueryOptions};
  use serde_json::json;
  use std::sync::Arc;

  #[tokio::test]
  async fn test_forwards_query_updates() {
    let mut events = EventHandler::new();
    let cache = Arc::new(QueryCache::new());
    let query = Query::new(
      cache,
      QueryOptions::new("todos", || async { Ok(json!([1, 2, 3])) }),
    );
    events.watch("todos".to_string(), query.subscribe());

    let mut last = None;
    while let Some(Event::Update { name, state }) = events.next().await {
      assert_eq!(name, "todos");
      if state.is_settled() {
        last = state.data;
        break;
      }
    }
    assert_eq!(last, Some(json!([1, 2, 3])));
  }
}
