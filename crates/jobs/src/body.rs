use std::any::Any;
use std::future::IntoFuture;
use std::marker::PhantomData;

use voxedit_task::{Completion, RunStep, Step, StepSource, completion};

use crate::context::{AreaLoader, JobContext};
use crate::job::JobId;

/// Error type job bodies fail with. Any collaborator error converts via `?`.
pub type BodyError = Box<dyn std::error::Error>;

/// Marker a body returns to unwind after observing a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Why a job produced no value.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job {0} was cancelled")]
    Cancelled(JobId),
    #[error("job failed: {0}")]
    Failed(BodyError),
}

impl JobError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// The computation a job runs, one step per call.
pub trait JobBody<W: AreaLoader> {
    type Output: 'static;

    fn step(&mut self, cx: &mut JobContext<'_, W>) -> Result<Step<Self::Output>, BodyError>;

    /// Called instead of the next step once cancellation is observed.
    fn cancelled(&mut self) {}
}

/// Closure body; see [`JobScheduler::run`](crate::JobScheduler::run).
pub(crate) struct FnBody<F, T> {
    f: F,
    _output: PhantomData<fn() -> T>,
}

impl<F, T> FnBody<F, T> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _output: PhantomData,
        }
    }
}

impl<W, T, F> JobBody<W> for FnBody<F, T>
where
    W: AreaLoader,
    T: 'static,
    F: FnMut(&mut JobContext<'_, W>) -> Result<Step<T>, BodyError>,
{
    type Output = T;

    fn step(&mut self, cx: &mut JobContext<'_, W>) -> Result<Step<T>, BodyError> {
        (self.f)(cx)
    }
}

/// Object-safe view of a [`JobBody`] with its output erased.
trait ErasedBody<W: AreaLoader> {
    fn step(&mut self, cx: &mut JobContext<'_, W>) -> Result<Step<Box<dyn Any>>, JobError>;
    fn cancelled(&mut self);
}

impl<W: AreaLoader, B: JobBody<W>> ErasedBody<W> for B {
    fn step(&mut self, cx: &mut JobContext<'_, W>) -> Result<Step<Box<dyn Any>>, JobError> {
        match JobBody::step(self, cx) {
            Ok(Step::Done(value)) => Ok(Step::Done(Box::new(value))),
            Ok(Step::Continue) => Ok(Step::Continue),
            Ok(Step::Yield) => Ok(Step::Yield),
            Ok(Step::Park) => Ok(Step::Park),
            Err(err) if err.is::<Cancelled>() => Err(JobError::Cancelled(cx.id())),
            Err(err) => Err(JobError::Failed(err)),
        }
    }

    fn cancelled(&mut self) {
        JobBody::cancelled(self);
    }
}

/// Step source the scheduler's task runtime drives.
pub(crate) struct JobTask<W: AreaLoader>(Box<dyn ErasedBody<W>>);

impl<W: AreaLoader> JobTask<W> {
    pub(crate) fn new<B: JobBody<W> + 'static>(body: B) -> Self {
        Self(Box::new(body))
    }
}

impl<W: AreaLoader> StepSource for JobTask<W> {
    type Output = Box<dyn Any>;
    type Error = JobError;

    fn cancelled(&mut self) {
        self.0.cancelled();
    }
}

impl<'a, W: AreaLoader> RunStep<JobContext<'a, W>> for JobTask<W> {
    fn step(&mut self, cx: &mut JobContext<'a, W>) -> Result<Step<Box<dyn Any>>, JobError> {
        self.0.step(cx)
    }
}

/// Hands an erased result to a typed [`JobHandle`].
pub(crate) type Deliver = Box<dyn FnOnce(Result<Box<dyn Any>, JobError>)>;

pub(crate) fn typed_delivery<T: 'static>(id: JobId) -> (Deliver, JobHandle<T>) {
    let (completer, completion) = completion::<Result<T, JobError>>();
    let deliver: Deliver = Box::new(move |result| {
        let typed = result.and_then(|value| {
            value
                .downcast::<T>()
                .map(|value| *value)
                .map_err(|_| JobError::Failed("job output has an unexpected type".into()))
        });
        completer.complete(typed);
    });
    (deliver, JobHandle { id, completion })
}

/// Awaitable result of a job.
pub struct JobHandle<T> {
    id: JobId,
    completion: Completion<Result<T, JobError>>,
}

impl<T> JobHandle<T> {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Whether the job has finished (its result may already be taken).
    pub fn is_settled(&self) -> bool {
        self.completion.is_settled()
    }

    pub fn try_take(&self) -> Option<Result<T, JobError>> {
        self.completion.try_take()
    }
}

impl<T> IntoFuture for JobHandle<T> {
    type Output = Result<T, JobError>;
    type IntoFuture = Completion<Result<T, JobError>>;

    fn into_future(self) -> Self::IntoFuture {
        self.completion
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_downcasts_output() {
        let (deliver, handle) = typed_delivery::<u32>(JobId(3));
        assert!(!handle.is_settled());
        deliver(Ok(Box::new(7u32)));
        assert_eq!(handle.try_take().unwrap().unwrap(), 7);
    }

    #[test]
    fn delivery_reports_type_mismatch() {
        let (deliver, handle) = typed_delivery::<u32>(JobId(3));
        deliver(Ok(Box::new("seven")));
        assert!(matches!(handle.try_take(), Some(Err(JobError::Failed(_)))));
    }

    #[test]
    fn cancelled_marker_is_a_body_error() {
        let err: BodyError = Cancelled.into();
        assert!(err.is::<Cancelled>());
        assert_eq!(JobError::Cancelled(JobId(5)).to_string(), "job 5 was cancelled");
        assert!(JobError::Cancelled(JobId(5)).is_cancelled());
    }
}
