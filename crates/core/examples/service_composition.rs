//! Example: composing services with the container
//!
//! Registers a small order-processing graph with every lifetime, resolves it
//! from two request scopes and prints the container report.
//!
//! Run with `RUST_LOG=tether_core=debug` to see creation and disposal events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tether_core::prelude::*;
use tether_core::ContainerOptions;
use tracing_subscriber::EnvFilter;

trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

#[derive(Default)]
struct TickClock {
    ticks: AtomicU64,
}

impl Clock for TickClock {
    fn now(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed)
    }
}

impl Injectable for TickClock {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new(|_| Ok(TickClock::default()))]
    }
}

impl_upcast!(TickClock => dyn Clock);

trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, message: &str) {
        println!("  [console] {}", message);
    }
}

impl Injectable for ConsoleNotifier {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new(|_| Ok(ConsoleNotifier))]
    }
}

impl_upcast!(ConsoleNotifier => dyn Notifier);

struct AuditNotifier {
    clock: Arc<dyn Clock>,
}

impl Notifier for AuditNotifier {
    fn notify(&self, message: &str) {
        println!("  [audit @{}] {}", self.clock.now(), message);
    }
}

impl Injectable for AuditNotifier {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new(|args| Ok(AuditNotifier { clock: args.next()? })).param::<dyn Clock>("clock")]
    }
}

impl_upcast!(AuditNotifier => dyn Notifier);

/// Per-request unit of work, disposed when the request scope ends
struct UnitOfWork {
    request: u64,
    pending: Mutex<Vec<String>>,
}

impl UnitOfWork {
    fn record(&self, change: impl Into<String>) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.push(change.into());
        }
    }
}

impl Disposable for UnitOfWork {
    fn dispose(&self) -> Result<(), BoxError> {
        let pending = self.pending.lock().map_err(|_| "unit of work lock poisoned")?;
        println!("  request {} committed {} change(s)", self.request, pending.len());
        Ok(())
    }
}

impl Injectable for UnitOfWork {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new(|args| {
            let clock: Arc<dyn Clock> = args.next()?;
            Ok(UnitOfWork {
                request: clock.now(),
                pending: Mutex::new(Vec::new()),
            })
        })
        .param::<dyn Clock>("clock")]
    }

    fn as_disposable(self: &Arc<Self>) -> Option<Arc<dyn Disposable>> {
        Some(self.clone())
    }
}

struct OrderService {
    unit_of_work: Arc<UnitOfWork>,
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl OrderService {
    fn place(&self, item: &str) {
        self.unit_of_work.record(format!("order {}", item));
        for notifier in &self.notifiers {
            notifier.notify(&format!("order placed: {}", item));
        }
    }
}

fn build_container() -> Result<Container, ContainerError> {
    let mut registry = ServiceRegistry::with_options(ContainerOptions::strict());
    registry
        .add_singleton::<dyn Clock, TickClock>()
        .add_singleton::<dyn Notifier, ConsoleNotifier>()
        .add_transient::<dyn Notifier, AuditNotifier>()
        .add_scoped::<UnitOfWork, UnitOfWork>()
        .add_transient_factory::<OrderService, _>(|resolver| {
            Ok(Arc::new(OrderService {
                unit_of_work: resolver.get_required_service::<UnitOfWork>()?,
                notifiers: resolver.get_services::<dyn Notifier>()?,
            }))
        });
    registry.build()
}

fn main() -> Result<(), ContainerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let container = build_container()?;

    for (request, items) in [["book", "lamp"], ["chair", "desk"]].iter().enumerate() {
        println!("request scope {}", request + 1);
        let scope = container.create_scope()?;
        for item in items {
            scope.get_required_service::<OrderService>()?.place(item);
        }
        scope.dispose()?;
    }

    println!();
    println!("{}", container.describe());

    container.dispose()
}
