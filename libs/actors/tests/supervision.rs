//! Group restarts, worker supervision and shutdown

mod common;

use async_trait::async_trait;
use common::{addr, start_recording, test_config, when_available, within};
use mesh_node::{
    ActorHandle, ChildSpec, NodeError, RestartPolicy, Worker, WorkerContext, WorkerKind,
};
use mesh_types::{Address, Message, Route};
use std::time::Duration;

/// Registers its configured address on start; panics on "panic", stops on "stop"
struct Service {
    address: Address,
}

#[async_trait]
impl Worker for Service {
    async fn on_start(&mut self, ctx: &mut WorkerContext) -> mesh_node::Result<()> {
        ctx.register(self.address.clone()).await
    }

    async fn handle(&mut self, ctx: &mut WorkerContext, message: Message) -> mesh_node::Result<()> {
        match message.payload().as_ref() {
            b"panic" => panic!("service asked to panic"),
            b"fail" => Err(NodeError::worker("service asked to fail")),
            b"stop" => {
                ctx.stop();
                Ok(())
            }
            // Echo back along the return route
            _ => ctx.route(message.reply(message.payload().clone())).await,
        }
    }
}

struct ServiceKind;

impl WorkerKind for ServiceKind {
    type Options = Address;

    fn name(&self) -> &str {
        "service"
    }

    fn create(&self, address: &Address) -> mesh_node::Result<Box<dyn Worker>> {
        Ok(Box::new(Service {
            address: address.clone(),
        }))
    }
}

fn command(to: &Address, payload: &'static [u8]) -> Message {
    Message::new(vec![to.clone()], Route::empty(), payload)
}

/// Wait until `address` is bound to an actor other than `old`
async fn rebound(node: &mesh_node::Node, address: &Address, old: mesh_node::ActorId) -> ActorHandle {
    within(async {
        loop {
            if let Ok(Some(handle)) = node.whereis(address).await {
                if handle.id() != old {
                    return handle;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

#[tokio::test]
async fn registry_crash_discards_all_bindings() {
    let (node, _router) = start_recording(test_config()).await;
    let (handle, _mailbox) = ActorHandle::channel();
    for byte in 1..=3 {
        node.register_address(addr(byte), handle.clone()).await.unwrap();
    }
    assert_eq!(node.generation(), 1);

    node.registry().current().unwrap().stop().unwrap();
    within(node.wait_for_generation(2)).await.unwrap();

    for byte in 1..=3 {
        let address = addr(byte);
        let found = when_available(|| node.whereis(&address)).await.unwrap();
        assert_eq!(found, None);
    }
    for byte in 1..=3 {
        node.register_address(addr(byte), handle.clone()).await.unwrap();
    }
    assert_eq!(node.restart_count(), 1);
    assert_eq!(node.metrics().group_restarts, 1);
}

#[tokio::test]
async fn registry_crash_restarts_the_pool_too() {
    let (node, _router) = start_recording(test_config()).await;
    node.start_supervised(ServiceKind, addr(0x10)).await.unwrap();
    assert_eq!(node.which_children().await.unwrap().len(), 1);

    node.registry().current().unwrap().stop().unwrap();
    within(node.wait_for_generation(2)).await.unwrap();

    // The new pool starts empty; the old child's binding went with the registry
    let children = when_available(|| node.which_children()).await.unwrap();
    assert!(children.is_empty());
    assert_eq!(node.whereis(&addr(0x10)).await.unwrap(), None);

    node.start_supervised(ServiceKind, addr(0x10)).await.unwrap();
    assert!(node.whereis(&addr(0x10)).await.unwrap().is_some());
}

#[tokio::test]
async fn supervised_worker_serves_routed_messages() {
    let (node, router) = start_recording(test_config()).await;
    let worker = node.start_supervised(ServiceKind, addr(0x20)).await.unwrap();
    assert_eq!(node.whereis(&addr(0x20)).await.unwrap(), Some(worker));

    let request = Message::new(vec![addr(0x20)], vec![addr(0x21)], b"hello".to_vec());
    node.dispatch(request).await.unwrap();

    within(async {
        while router.routed().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    let reply = &router.routed()[0];
    assert!(reply.is_addressed_to(&addr(0x21)));
    assert_eq!(reply.payload().as_ref(), b"hello");
}

#[tokio::test]
async fn crashed_worker_restarts_without_touching_siblings() {
    let (node, _router) = start_recording(test_config()).await;
    let crashing = node.start_supervised(ServiceKind, addr(0x30)).await.unwrap();
    let sibling = node.start_supervised(ServiceKind, addr(0x31)).await.unwrap();

    node.send(addr(0x30), command(&addr(0x30), b"panic")).await.unwrap();
    let restarted = rebound(&node, &addr(0x30), crashing.id()).await;

    assert_ne!(restarted.id(), crashing.id());
    assert_eq!(node.whereis(&addr(0x31)).await.unwrap(), Some(sibling));
    assert_eq!(node.generation(), 1);
    assert_eq!(node.metrics().worker_restarts, 1);
}

#[tokio::test]
async fn transient_worker_stopping_normally_is_released() {
    let (node, _router) = start_recording(test_config()).await;
    let spec = ChildSpec::new(ServiceKind, addr(0x40)).with_restart(RestartPolicy::Transient);
    node.start_child(spec).await.unwrap();

    node.send(addr(0x40), command(&addr(0x40), b"stop")).await.unwrap();

    within(async {
        while !node.which_children().await.unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert_eq!(node.whereis(&addr(0x40)).await.unwrap(), None);
}

#[tokio::test]
async fn pool_restart_intensity_escalates_to_group() {
    // Pool allows two restarts per window
    let (node, _router) = start_recording(test_config()).await;
    let (bystander, _mailbox) = ActorHandle::channel();
    node.register_address(addr(0x51), bystander.clone()).await.unwrap();
    let mut current = node.start_supervised(ServiceKind, addr(0x50)).await.unwrap();

    for _ in 0..2 {
        node.send(addr(0x50), command(&addr(0x50), b"fail")).await.unwrap();
        current = rebound(&node, &addr(0x50), current.id()).await;
    }
    node.send(addr(0x50), command(&addr(0x50), b"fail")).await.unwrap();

    within(node.wait_for_generation(2)).await.unwrap();
    let children = when_available(|| node.which_children()).await.unwrap();
    assert!(children.is_empty());
    assert_eq!(node.metrics().group_restarts, 1);

    // Bindings made outside the pool go with the old registry too
    let bystander_address = addr(0x51);
    let found = when_available(|| node.whereis(&bystander_address)).await.unwrap();
    assert_eq!(found, None);
    node.register_address(addr(0x51), bystander).await.unwrap();
}

#[tokio::test]
async fn start_failure_is_reported_and_not_kept() {
    let (node, _router) = start_recording(test_config()).await;
    let (squatter, _mailbox) = ActorHandle::channel();
    node.register_address(addr(0x60), squatter).await.unwrap();

    let err = node
        .start_supervised(ServiceKind, addr(0x60))
        .await
        .unwrap_err();

    assert!(matches!(err, NodeError::Start { ref kind, .. } if kind == "service"));
    assert!(node.which_children().await.unwrap().is_empty());
}

#[tokio::test]
async fn terminate_child_unbinds_its_addresses() {
    let (node, _router) = start_recording(test_config()).await;
    let worker = node.start_supervised(ServiceKind, addr(0x70)).await.unwrap();

    node.terminate_child(worker.id()).await.unwrap();

    assert_eq!(node.whereis(&addr(0x70)).await.unwrap(), None);
    assert!(matches!(
        node.terminate_child(worker.id()).await,
        Err(NodeError::UnknownChild(_))
    ));
}

#[tokio::test]
async fn group_gives_up_after_restart_limit() {
    let mut config = test_config();
    config.supervision.max_restarts = 1;
    let (node, _router) = start_recording(config).await;

    node.registry().current().unwrap().stop().unwrap();
    within(node.wait_for_generation(2)).await.unwrap();
    let registry = within(async {
        loop {
            if let Ok(registry) = node.registry().current() {
                return registry;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    registry.stop().unwrap();

    // The supervisor gives up on its own; shutdown only collects the reason
    within(async {
        while node.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    let result = within(node.shutdown()).await;
    assert!(matches!(
        result,
        Err(NodeError::RestartIntensityExceeded { ref member }) if member == "address registry"
    ));
    assert!(matches!(
        node.whereis(&addr(1)).await,
        Err(NodeError::RegistryUnavailable)
    ));
}

#[tokio::test]
async fn shutdown_stops_everything() {
    let (node, _router) = start_recording(test_config()).await;
    node.start_supervised(ServiceKind, addr(0x80)).await.unwrap();
    assert!(node.is_running());

    within(node.shutdown()).await.unwrap();

    assert!(!node.is_running());
    assert!(matches!(
        node.whereis(&addr(0x80)).await,
        Err(NodeError::RegistryUnavailable)
    ));
    assert!(matches!(
        node.which_children().await,
        Err(NodeError::PoolUnavailable)
    ));
    // Second call is a no-op
    node.shutdown().await.unwrap();
}
