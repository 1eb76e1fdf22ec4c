//! Per-thread stack of the types currently under construction.
//!
//! Frames are pushed by [`enter`] and popped when the returned guard drops,
//! so the stack unwinds on every error path.

use crate::container::descriptor::{DescriptorId, ServiceId};
use crate::errors::ContainerError;
use std::cell::RefCell;
use std::marker::PhantomData;

thread_local! {
    static CHAIN: RefCell<Vec<ChainEntry>> = const { RefCell::new(Vec::new()) };
}

/// One construction in progress.
///
/// Constructor-built types are identified by their implementation type alone.
/// Factory registrations also carry their descriptor, so a factory may build
/// its own contract type through the activator without tripping the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChainEntry {
    service: ServiceId,
    registration: Option<DescriptorId>,
}

impl ChainEntry {
    pub(crate) fn factory(service: ServiceId, registration: DescriptorId) -> Self {
        Self {
            service,
            registration: Some(registration),
        }
    }
}

impl From<ServiceId> for ChainEntry {
    fn from(service: ServiceId) -> Self {
        Self {
            service,
            registration: None,
        }
    }
}

/// Guard for one entry on the resolution chain
#[must_use = "the frame is popped as soon as the guard is dropped"]
pub(crate) struct ChainFrame {
    // Frames belong to the thread that pushed them.
    _not_send: PhantomData<*const ()>,
}

impl Drop for ChainFrame {
    fn drop(&mut self) {
        let _ = CHAIN.try_with(|chain| {
            chain.borrow_mut().pop();
        });
    }
}

/// Push `entry` onto the chain, failing on a revisit or when `limit` is reached
pub(crate) fn enter(entry: impl Into<ChainEntry>, limit: usize) -> Result<ChainFrame, ContainerError> {
    let entry = entry.into();
    CHAIN.with(|chain| {
        let mut chain = chain.borrow_mut();

        if chain.contains(&entry) {
            let mut path = render(&chain);
            path.push_str(" -> ");
            path.push_str(entry.service.type_name());
            return Err(ContainerError::CircularDependency { chain: path });
        }

        if chain.len() >= limit {
            return Err(ContainerError::ResolutionDepthExceeded {
                limit,
                chain: render(&chain),
            });
        }

        chain.push(entry);
        Ok(ChainFrame {
            _not_send: PhantomData,
        })
    })
}

/// Current chain rendered as `A -> B -> C`, empty outside any construction
pub(crate) fn current_path() -> String {
    CHAIN
        .try_with(|chain| render(&chain.borrow()))
        .unwrap_or_default()
}

pub(crate) fn depth() -> usize {
    CHAIN.try_with(|chain| chain.borrow().len()).unwrap_or(0)
}

fn render(chain: &[ChainEntry]) -> String {
    chain
        .iter()
        .map(|entry| entry.service.type_name())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;

    #[test]
    fn test_frames_pop_on_drop() {
        {
            let _a = enter(ServiceId::of::<A>(), 8).unwrap();
            let _b = enter(ServiceId::of::<B>(), 8).unwrap();
            assert_eq!(depth(), 2);
        }
        assert_eq!(depth(), 0);
        assert_eq!(current_path(), "");
    }

    #[test]
    fn test_revisit_is_reported_with_full_chain() {
        let _a = enter(ServiceId::of::<A>(), 8).unwrap();
        let _b = enter(ServiceId::of::<B>(), 8).unwrap();

        match enter(ServiceId::of::<A>(), 8) {
            Err(ContainerError::CircularDependency { chain }) => {
                let a = std::any::type_name::<A>();
                let b = std::any::type_name::<B>();
                assert_eq!(chain, format!("{a} -> {b} -> {a}"));
            }
            _ => panic!("expected a circular dependency"),
        }
        assert_eq!(depth(), 2);
    }

    #[test]
    fn test_factory_frames_are_distinct_from_type_frames() {
        let _factory = enter(ChainEntry::factory(ServiceId::of::<A>(), DescriptorId(0)), 8).unwrap();
        let _activator = enter(ServiceId::of::<A>(), 8).unwrap();
        assert_eq!(depth(), 2);

        let again = enter(ChainEntry::factory(ServiceId::of::<A>(), DescriptorId(0)), 8);
        assert!(matches!(again, Err(ContainerError::CircularDependency { .. })));
        assert!(enter(ChainEntry::factory(ServiceId::of::<A>(), DescriptorId(1)), 8).is_ok());
    }

    #[test]
    fn test_depth_limit() {
        let _a = enter(ServiceId::of::<A>(), 1).unwrap();
        let result = enter(ServiceId::of::<B>(), 1);
        assert!(matches!(
            result,
            Err(ContainerError::ResolutionDepthExceeded { limit: 1, .. })
        ));
    }
}
