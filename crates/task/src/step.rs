use std::marker::PhantomData;

/// Outcome of drawing one step from a step source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    /// One unit of work ran; the task may keep going this tick.
    Continue,
    /// One unit of work ran; give control back to the host until the next tick.
    Yield,
    /// The step could not run yet and did nothing. The same step is drawn
    /// again on a later resume.
    Park,
    /// The source is exhausted. Carries the task's return value; no unit of
    /// work is counted for this draw.
    Done(T),
}

/// A lazy sequence of steps with a final value.
///
/// The output and error types are fixed per source; the context a step runs
/// against is chosen by [`RunStep`].
pub trait StepSource {
    type Output;
    type Error;

    /// Called once when the runtime observes a cancellation request, instead
    /// of drawing the next step. Sources release what they hold here.
    fn cancelled(&mut self) {}
}

/// A step source that can be advanced against a context `C`.
pub trait RunStep<C: ?Sized>: StepSource {
    /// Execute exactly one step. Never called again after `Done` or an error.
    fn step(&mut self, cx: &mut C) -> Result<Step<Self::Output>, Self::Error>;
}

impl<S: StepSource + ?Sized> StepSource for Box<S> {
    type Output = S::Output;
    type Error = S::Error;

    fn cancelled(&mut self) {
        (**self).cancelled();
    }
}

impl<C: ?Sized, S: RunStep<C> + ?Sized> RunStep<C> for Box<S> {
    fn step(&mut self, cx: &mut C) -> Result<Step<Self::Output>, Self::Error> {
        (**self).step(cx)
    }
}

/// Step source backed by a closure; see [`from_fn`].
pub struct FromFn<F, T, E> {
    f: F,
    _marker: PhantomData<fn() -> Result<T, E>>,
}

/// Build a step source from a closure called once per step.
pub fn from_fn<C, T, E, F>(f: F) -> FromFn<F, T, E>
where
    C: ?Sized,
    F: FnMut(&mut C) -> Result<Step<T>, E>,
{
    FromFn {
        f,
        _marker: PhantomData,
    }
}

impl<F, T, E> StepSource for FromFn<F, T, E> {
    type Output = T;
    type Error = E;
}

impl<C, F, T, E> RunStep<C> for FromFn<F, T, E>
where
    C: ?Sized,
    F: FnMut(&mut C) -> Result<Step<T>, E>,
{
    fn step(&mut self, cx: &mut C) -> Result<Step<T>, E> {
        (self.f)(cx)
    }
}

/// Step source over an iterator: every item is one step, exhaustion completes
/// the task with `()`. Works against any context.
pub struct IterSteps<I> {
    iter: I,
}

/// Adapt an iterator of step results into a step source.
pub fn from_iter<I, E>(iter: I) -> IterSteps<I::IntoIter>
where
    I: IntoIterator<Item = Result<(), E>>,
{
    IterSteps {
        iter: iter.into_iter(),
    }
}

impl<I, E> StepSource for IterSteps<I>
where
    I: Iterator<Item = Result<(), E>>,
{
    type Output = ();
    type Error = E;
}

impl<C: ?Sized, I, E> RunStep<C> for IterSteps<I>
where
    I: Iterator<Item = Result<(), E>>,
{
    fn step(&mut self, _cx: &mut C) -> Result<Step<()>, E> {
        match self.iter.next() {
            Some(Ok(())) => Ok(Step::Continue),
            Some(Err(e)) => Err(e),
            None => Ok(Step::Done(())),
        }
    }
}
