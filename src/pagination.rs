/// Ensure-loaded control loop and its guard state.
///
/// The loop keeps calling an injected fetch step until enough rows are
/// loaded for the requested page window. It is serialized by an in-flight
/// flag, abandoned by a sequence bump when its inputs change, and stopped
/// by a cancellation token. It must make progress every iteration or end.

use crate::config::PipelineConfig;
use crate::errors::FeedResult;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };

/// Cooperative cancellation flag, checked after every awaited step.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxedReason {
    AttemptsExhausted,
    NoNextPage,
}

#[derive(Default)]
struct EnsureInner {
    in_flight: AtomicBool,
    seq: AtomicU64,
}

/// Shared loop guards. A bumped sequence invalidates any loop instance
/// started under an older value, so a stale run stops mutating state.
/// Clones share the same guards.
#[derive(Clone, Default)]
pub struct EnsureState {
    inner: Arc<EnsureInner>,
}

impl EnsureState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate in-progress runs; called when address/filter change.
    pub fn bump_seq(&self) {
        self.inner.seq.fetch_add(1, Ordering::SeqCst);
    }

    pub fn seq(&self) -> u64 {
        self.inner.seq.load(Ordering::SeqCst)
    }

    fn try_begin(&self) -> bool {
        self.inner
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn end(&self) {
        self.inner.in_flight.store(false, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn force_in_flight(&self) {
        self.inner.in_flight.store(true, Ordering::SeqCst);
    }
}

/// Snapshot of loading progress fed into and out of each fetch step.
#[derive(Debug, Clone, Copy)]
pub struct FetchProgress {
    pub loaded: usize,
    pub has_next: bool,
}

#[derive(Debug)]
pub struct EnsureOutcome {
    pub attempts: usize,
    pub maxed: Option<MaxedReason>,
    /// False when the run was skipped (already in flight) or abandoned
    /// (cancelled or out-sequenced).
    pub completed: bool,
}

/// Rows that must be loaded to show `page_index` plus the lookahead
/// ladder. The unfiltered view adds live-arrived rows so they cannot push
/// requested rows off-page.
pub fn required_count(config: &PipelineConfig, page_index: usize, new_items: usize) -> usize {
    config.required_rows(page_index) + new_items
}

/// Route deep page jumps through the one-shot offset window instead of
/// sequential cursor fetches.
pub fn should_use_fast_window(config: &PipelineConfig, page_index: usize) -> bool {
    config.pagination.enable_fast_offset_mode
        && page_index >= config.pagination.fast_offset_threshold_pages
}

/// Drive `fetch_more` over `ctx` until `required` rows are loaded, the
/// server runs out of pages, or the attempt cap is hit. A failed fetch
/// ends the run immediately.
pub async fn ensure_loaded<Ctx: ?Sized>(
    state: &EnsureState,
    cancel: &CancelToken,
    ctx: &mut Ctx,
    initial: FetchProgress,
    required: usize,
    max_attempts: usize,
    mut fetch_more: impl for<'a> FnMut(&'a mut Ctx) -> BoxFuture<'a, FeedResult<FetchProgress>>,
) -> EnsureOutcome {
    if !state.try_begin() {
        return EnsureOutcome { attempts: 0, maxed: None, completed: false };
    }
    let my_seq = state.seq();

    let mut progress = initial;
    let mut attempts = 0;
    let mut maxed = None;
    let mut completed = true;

    loop {
        if cancel.is_cancelled() || state.seq() != my_seq {
            completed = false;
            break;
        }
        if progress.loaded >= required {
            break;
        }
        if !progress.has_next {
            maxed = Some(MaxedReason::NoNextPage);
            break;
        }
        if attempts >= max_attempts {
            maxed = Some(MaxedReason::AttemptsExhausted);
            break;
        }

        attempts += 1;
        let before = progress.loaded;
        match fetch_more(ctx).await {
            Ok(next) => {
                progress = next;
                // A fetch that neither grows the set nor closes the
                // cursor would spin forever against a static page.
                if progress.loaded <= before && progress.has_next {
                    log::warn!(
                        "[PAGINATION] Fetch made no progress at {} loaded rows, stopping",
                        progress.loaded
                    );
                    break;
                }
            }
            Err(err) => {
                log::warn!("[PAGINATION] Fetch failed after {} attempt(s): {}", attempts, err);
                break;
            }
        }
    }

    state.end();
    EnsureOutcome { attempts, maxed, completed }
}
