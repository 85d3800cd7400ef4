use std::collections::HashMap;
use std::time::Duration;
use strand::{Strand, StrandError};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Error, Debug)]
enum StoreError {
  #[error("key '{0}' not found")]
  NotFound(String),
  #[error("store is closing")]
  Closing,
  #[error(transparent)]
  Strand(#[from] StrandError),
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Basic Strand Example ---");

  // The map is owned by the strand's consumer; only submitted operations touch it.
  let store = Strand::new("kv_store", 8, Handle::current(), HashMap::<String, u64>::new());

  let mut writers = Vec::new();
  for i in 0..4u64 {
    let store = store.clone();
    writers.push(tokio::spawn(async move {
      store
        .with_resource(format!("put_{}", i), move |map: &mut HashMap<String, u64>| {
          *map.entry("hits".to_string()).or_insert(0) += i;
          Ok::<_, StoreError>(())
        })
        .await
    }));
  }
  for writer in writers {
    if let Err(e) = writer.await.expect("writer task panicked") {
      info!("Writer failed: {}", e);
    }
  }

  let missing = store
    .with_resource("get_missing", |map: &mut HashMap<String, u64>| {
      map.get("missing").copied().ok_or_else(|| StoreError::NotFound("missing".to_string()))
    })
    .await;
  info!("Lookup of missing key: {:?}", missing);

  let closing = CancellationToken::new();
  let slow = {
    let store = store.clone();
    let closing = closing.clone();
    tokio::spawn(async move {
      store
        .with_resource_or_cancel(
          "compact",
          |map: &mut HashMap<String, u64>| {
            std::thread::sleep(Duration::from_millis(1200));
            Ok::<_, StoreError>(map.len())
          },
          &closing,
          StoreError::Closing,
        )
        .await
    })
  };
  tokio::time::sleep(Duration::from_millis(100)).await;
  closing.cancel();
  info!("Compaction (accepted before cancellation): {:?}", slow.await.expect("compact task panicked"));

  let late = store.submit_or_cancel("after_close", || Ok::<_, StoreError>(()), &closing, StoreError::Closing).await;
  info!("Submission after cancellation: {:?}", late);

  match store.shutdown().await {
    Ok(map) => info!("Strand shut down. Final hits: {:?}", map.get("hits")),
    Err(e) => info!("Shutdown failed: {}", e),
  }
  info!("--- Basic Strand Example End ---");
}
