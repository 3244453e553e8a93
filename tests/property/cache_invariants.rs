//! Property tests for the cache-and-resync invariants.
//!
//! For any interleaving of offline, failing and successful sync attempts,
//! while the backend keeps changing underneath:
//!
//! 1. Offline attempts report `pending` and leave every cache entry as it was.
//! 2. Failed attempts report `error` and leave every cache entry as it was.
//! 3. Successful attempts report `synced` and `taskLists` equals the backend.
//! 4. The cached lists always equal the result of the last successful sync,
//!    and so does the in-memory projection.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use tasksync::cache::{InMemoryStore, KeyValueStore, LocalCache};
use tasksync::connectivity::ConnectivityMonitor;
use tasksync::gateway::{GatewayError, GatewayOp, LoopbackGateway, RemoteGateway};
use tasksync::state::{AppState, SyncStatus};
use tasksync::sync::{SyncConfig, SyncOrchestrator, SyncOutcome};
use tasksync_proto::TaskList;

#[derive(Debug, Clone, Copy)]
enum Link {
    Offline,
    Failing,
    Online,
}

#[derive(Debug, Clone)]
struct Step {
    link: Link,
    full: bool,
    new_list: Option<String>,
}

fn arb_step() -> impl Strategy<Value = Step> {
    let link = prop_oneof![Just(Link::Offline), Just(Link::Failing), Just(Link::Online)];
    (link, any::<bool>(), prop::option::of("[a-z]{1,8}")).prop_map(|(link, full, new_list)| Step {
        link,
        full,
        new_list,
    })
}

async fn snapshot(store: &InMemoryStore) -> BTreeMap<String, Option<String>> {
    let mut entries = BTreeMap::new();
    for key in store.keys().await.unwrap() {
        let value = store.get(&key).await.unwrap();
        entries.insert(key, value);
    }
    entries
}

async fn run(steps: Vec<Step>) -> Result<(), TestCaseError> {
    let gateway = Arc::new(LoopbackGateway::new());
    let store = Arc::new(InMemoryStore::new());
    let monitor = Arc::new(ConnectivityMonitor::manual(true));
    let state = Arc::new(AppState::new());
    let sync = SyncOrchestrator::new(
        Arc::clone(&gateway),
        LocalCache::new(Arc::clone(&store)),
        Arc::clone(&monitor),
        Arc::clone(&state),
        SyncConfig::default(),
    );
    gateway.seed_list("Inbox");

    let mut last_good: Vec<TaskList> = Vec::new();
    for step in steps {
        if let Some(title) = &step.new_list {
            gateway.seed_list(title);
        }
        let before = snapshot(&store).await;

        match step.link {
            Link::Offline => monitor.report(false),
            Link::Failing => {
                monitor.report(true);
                gateway.fail_next(
                    GatewayOp::ListTaskLists,
                    GatewayError::Server {
                        status: 503,
                        message: "unavailable".into(),
                    },
                );
            }
            Link::Online => monitor.report(true),
        }

        let outcome = if step.full {
            sync.sync_all().await
        } else {
            sync.sync_task_lists().await
        };

        match step.link {
            Link::Offline => {
                prop_assert_eq!(&outcome, &SyncOutcome::Pending);
                prop_assert_eq!(&snapshot(&store).await, &before);
            }
            Link::Failing => {
                prop_assert!(matches!(outcome, SyncOutcome::Failed(_)));
                prop_assert_eq!(state.sync_state().status, SyncStatus::Error);
                prop_assert_eq!(&snapshot(&store).await, &before);
            }
            Link::Online => {
                prop_assert_eq!(&outcome, &SyncOutcome::Synced);
                last_good = gateway.list_task_lists().await.unwrap();
                prop_assert_eq!(&sync.cached_task_lists().await, &last_good);
            }
        }

        prop_assert_eq!(&sync.cached_task_lists().await, &last_good);
        prop_assert_eq!(&state.task_lists(), &last_good);
    }
    Ok(())
}

proptest! {
    #[test]
    fn cache_reflects_only_successful_syncs(steps in prop::collection::vec(arb_step(), 1..24)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(run(steps))?;
    }
}
