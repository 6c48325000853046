//! Flush controller.
//!
//! An element goes `Uninitialized -> Idle` on `ready()`, then alternates
//! between `Idle`, `Pending` (a deferred flush is scheduled) and `Flushing`.
//! Invalidations while flushing are absorbed by the running loop, which keeps
//! taking pending batches until none is left.

use tempera_relief::FlushMode;

use crate::accessors::PendingBatch;
use crate::effects::{Phase, PhaseRun};
use crate::element::Element;
use crate::error::{EffectFailure, EngineError, HandlerError};
use crate::scheduler::TaskHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushState {
    #[default]
    Uninitialized,
    /// A deferred flush is scheduled.
    Pending,
    Flushing,
    Idle,
}

#[derive(Default)]
pub(crate) struct FlushController {
    pub state: FlushState,
    /// `ready()` has run.
    pub data_enabled: bool,
    /// Invalidation flushes; set when clients first become ready.
    pub data_ready: bool,
    pub clients_ready: bool,
    pub scheduled: Option<TaskHandle>,
    pub pending_clients: Vec<Element>,
}

impl Element {
    pub fn flush_state(&self) -> FlushState {
        self.inner.flush.borrow().state
    }

    /// Whether `ready()` has run.
    pub fn is_enabled(&self) -> bool {
        self.inner.flush.borrow().data_enabled
    }

    /// First flush. Stamps and attaches the class template, readies the
    /// clients found in it and dispatches everything written so far.
    ///
    /// Stamping errors are returned before the element is enabled, so a
    /// failed `ready()` leaves it as it was.
    pub fn ready(&self) -> Result<(), EngineError> {
        if self.is_enabled() {
            return Ok(());
        }

        let mut failures = Vec::new();
        if let Some(template) = self.inner.class.template.as_ref() {
            if self.inner.root.borrow().is_some() {
                return Err(EngineError::AlreadyAttached);
            }
            let bound = self.bind_parsed(&template.content, template.info.clone(), &mut failures)?;
            self.attach_dom(bound)?;
        }

        {
            let mut flush = self.inner.flush.borrow_mut();
            flush.data_enabled = true;
            if flush.state == FlushState::Uninitialized {
                flush.state = FlushState::Idle;
            }
        }
        tracing::debug!("ready <{}>", self.local_name());

        self.drain(&mut failures);
        if !self.inner.flush.borrow().clients_ready {
            self.flush_clients(&mut failures);
        }
        self.drain(&mut failures);
        self.report(failures)
    }

    /// Flush pending writes now, cancelling a scheduled flush.
    pub fn flush(&self) -> Result<(), EngineError> {
        self.cancel_scheduled_flush();
        let mut failures = Vec::new();
        self.drain(&mut failures);
        self.report(failures)
    }

    /// Request a flush after writes. Nothing happens before the element is
    /// ready or while a flush is running.
    pub(crate) fn invalidate(&self) -> Result<(), EngineError> {
        {
            let flush = self.inner.flush.borrow();
            if !flush.data_ready || flush.state == FlushState::Flushing {
                return Ok(());
            }
        }
        match (self.inner.settings.flush_mode, self.inner.scheduler.as_ref()) {
            (FlushMode::Deferred, Some(_)) => {
                self.schedule_flush();
                Ok(())
            }
            _ => self.flush(),
        }
    }

    fn schedule_flush(&self) {
        let Some(scheduler) = self.inner.scheduler.clone() else {
            return;
        };
        if self.inner.flush.borrow().scheduled.is_some() {
            return;
        }
        let element = self.downgrade();
        let handle = scheduler.run(Box::new(move || {
            if let Some(element) = element.upgrade() {
                element.run_scheduled_flush();
            }
        }));
        let mut flush = self.inner.flush.borrow_mut();
        flush.scheduled = Some(handle);
        flush.state = FlushState::Pending;
    }

    fn cancel_scheduled_flush(&self) {
        let handle = self.inner.flush.borrow_mut().scheduled.take();
        if let (Some(handle), Some(scheduler)) = (handle, self.inner.scheduler.as_ref()) {
            scheduler.cancel(handle);
        }
    }

    /// Deferred flushes have no caller to return failures to.
    fn run_scheduled_flush(&self) {
        self.inner.flush.borrow_mut().scheduled = None;
        let mut failures = Vec::new();
        self.drain(&mut failures);
        if failures.is_empty() {
            return;
        }
        let hook = self.inner.error_hook.borrow().clone();
        match hook {
            Some(hook) => failures.iter().for_each(|f| hook(f)),
            None => {
                for failure in &failures {
                    tracing::error!("deferred flush of <{}>: {}", self.local_name(), failure);
                }
            }
        }
    }

    /// The flush loop. Re-entrant calls return immediately.
    fn drain(&self, failures: &mut Vec<EffectFailure>) {
        {
            let mut flush = self.inner.flush.borrow_mut();
            if flush.state == FlushState::Flushing {
                return;
            }
            flush.state = FlushState::Flushing;
        }
        let mut batches = 0usize;
        loop {
            let batch = self.inner.store.borrow_mut().take_pending();
            let Some(batch) = batch else {
                break;
            };
            batches += 1;
            tracing::trace!("<{}> batch {}: {} change(s)", self.local_name(), batches, batch.changed.len());
            self.properties_changed(batch, failures);
        }
        self.inner.store.borrow_mut().clear_temp();

        let mut flush = self.inner.flush.borrow_mut();
        flush.state = if flush.data_enabled {
            FlushState::Idle
        } else {
            FlushState::Uninitialized
        };
        if batches > 0 {
            tracing::debug!(
                "flushed <{}>: {} batch(es), {} failure(s)",
                self.local_name(),
                batches,
                failures.len()
            );
        }
    }

    /// Dispatch one batch: COMPUTE, PROPAGATE (own table, then bound
    /// templates), client flush, REFLECT, OBSERVE, NOTIFY.
    fn properties_changed(&self, mut batch: PendingBatch, failures: &mut Vec<EffectFailure>) {
        self.run_computed_effects(&mut batch, failures);
        let to_notify = self.inner.store.borrow_mut().take_to_notify();

        let graph = self.graph();
        let mut run = PhaseRun {
            phase: Phase::Propagate,
            table: &graph.effects,
            old: &batch.old,
            has_paths: batch.has_paths,
            template: None,
        };
        self.run_effects(&run, &batch.changed, failures);
        let templates = self.inner.templates.borrow().clone();
        for bound in &templates {
            self.run_template_effects(bound, &batch.changed, &batch.old, batch.has_paths, failures);
        }

        self.flush_clients(failures);

        for phase in [Phase::Reflect, Phase::Observe] {
            run.phase = phase;
            self.run_effects(&run, &batch.changed, failures);
        }

        if let Some(to_notify) = to_notify {
            self.run_notify_effects(
                &to_notify,
                &batch.changed,
                &batch.old,
                batch.has_paths,
                failures,
            );
        }
    }

    /// Queue a client element for the next client flush.
    pub(crate) fn enqueue_client(&self, client: &Element) {
        let mut flush = self.inner.flush.borrow_mut();
        if !flush.pending_clients.iter().any(|c| c.ptr_eq(client)) {
            flush.pending_clients.push(client.clone());
        }
    }

    /// Ready clients that are not ready yet and flush the others. The first
    /// call marks this element's data ready.
    pub(crate) fn flush_clients(&self, failures: &mut Vec<EffectFailure>) {
        let (first, clients) = {
            let mut flush = self.inner.flush.borrow_mut();
            let first = !flush.clients_ready;
            flush.clients_ready = true;
            (first, std::mem::take(&mut flush.pending_clients))
        };
        for client in clients {
            let result = if !client.is_enabled() {
                client.ready()
            } else if client.has_pending() {
                client.flush()
            } else {
                Ok(())
            };
            match result {
                Ok(()) => {}
                Err(EngineError::EffectFailures(list)) => failures.extend(list),
                Err(err) => failures.push(EffectFailure {
                    phase: Phase::Propagate,
                    property: client.local_name().into(),
                    error: HandlerError::new(err.to_string()),
                }),
            }
        }
        if first {
            self.inner.flush.borrow_mut().data_ready = true;
        }
    }

    /// Hand failures to the error hook, or return them.
    pub(crate) fn report(&self, failures: Vec<EffectFailure>) -> Result<(), EngineError> {
        if failures.is_empty() {
            return Ok(());
        }
        let hook = self.inner.error_hook.borrow().clone();
        match hook {
            Some(hook) => {
                failures.iter().for_each(|f| hook(f));
                Ok(())
            }
            None => Err(EngineError::EffectFailures(failures)),
        }
    }
}
