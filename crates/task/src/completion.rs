use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Why a task did not produce a value.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TaskError<E> {
    #[error("task was cancelled")]
    Cancelled,
    #[error("task failed: {0}")]
    Failed(E),
}

struct Slot<T> {
    value: Option<T>,
    settled: bool,
    waker: Option<Waker>,
}

/// Write side of a one-shot result slot.
pub struct Completer<T> {
    slot: Rc<RefCell<Slot<T>>>,
}

/// Read side of a one-shot result slot.
///
/// Clones share the slot; the value can be taken once. Also a [`Future`]
/// that resolves when the value is delivered.
pub struct Completion<T> {
    slot: Rc<RefCell<Slot<T>>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

/// Create a linked completer/completion pair.
pub fn completion<T>() -> (Completer<T>, Completion<T>) {
    let slot = Rc::new(RefCell::new(Slot {
        value: None,
        settled: false,
        waker: None,
    }));
    (
        Completer {
            slot: Rc::clone(&slot),
        },
        Completion { slot },
    )
}

impl<T> Completer<T> {
    /// Deliver the value and wake an awaiting future.
    pub fn complete(self, value: T) {
        let waker = {
            let mut slot = self.slot.borrow_mut();
            slot.value = Some(value);
            slot.settled = true;
            slot.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl<T> Completion<T> {
    /// Whether the value has been delivered (taken or not).
    pub fn is_settled(&self) -> bool {
        self.slot.borrow().settled
    }

    /// Whether the value is delivered and still waiting to be taken.
    pub fn is_ready(&self) -> bool {
        self.slot.borrow().value.is_some()
    }

    /// Take the delivered value, if any.
    pub fn try_take(&self) -> Option<T> {
        self.slot.borrow_mut().value.take()
    }

    /// Inspect the delivered value without taking it.
    pub fn peek<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.slot.borrow().value.as_ref().map(f)
    }
}

impl<T> Future for Completion<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut slot = self.slot.borrow_mut();
        match slot.value.take() {
            Some(value) => Poll::Ready(value),
            None => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
