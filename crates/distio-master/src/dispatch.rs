//! `tell(target).to(task, payload)` — one-shot dispatch to a single slave or
//! a collection, per `SPEC_FULL.md` §4.5.

use std::sync::Arc;

use distio_core::{DistioError, Response, ResponseArray};

use crate::slave::SlaveHandle;

/// What a [`Tell`] targets: one slave, or an ordered collection.
pub enum TellTarget {
    One(Arc<SlaveHandle>),
    Many(Vec<Arc<SlaveHandle>>),
}

impl From<Arc<SlaveHandle>> for TellTarget {
    fn from(handle: Arc<SlaveHandle>) -> Self {
        Self::One(handle)
    }
}

impl From<Vec<Arc<SlaveHandle>>> for TellTarget {
    fn from(handles: Vec<Arc<SlaveHandle>>) -> Self {
        Self::Many(handles)
    }
}

/// The result of [`Tell::to`]: a bare [`Response`] for a single target, or a
/// [`ResponseArray`] in the target collection's original order.
pub enum TellOutcome {
    Single(Response),
    Many(ResponseArray),
}

impl TellOutcome {
    pub fn into_single(self) -> Option<Response> {
        match self {
            Self::Single(r) => Some(r),
            Self::Many(_) => None,
        }
    }

    pub fn into_many(self) -> Option<ResponseArray> {
        match self {
            Self::Many(a) => Some(a),
            Self::Single(_) => None,
        }
    }
}

/// One-shot dispatch builder. See `tell`.
pub struct Tell {
    target: TellTarget,
    catch_all: bool,
}

/// Begin a `tell(target).to(task, payload)` dispatch.
pub fn tell(target: impl Into<TellTarget>) -> Tell {
    Tell {
        target: target.into(),
        catch_all: false,
    }
}

impl Tell {
    /// When targeting a collection, convert per-slot dispatch failures into
    /// error-carrying `Response`s instead of aborting the whole call on the
    /// first error.
    pub fn catch_all(mut self, enabled: bool) -> Self {
        self.catch_all = enabled;
        self
    }

    /// Dispatch `task_name` with `payload` to the target(s).
    ///
    /// # Errors
    ///
    /// For a single target, propagates that slave's `dispatch` error
    /// directly. For a collection without `catch_all`, returns the first
    /// error encountered (aggregate fails fast); with `catch_all`, never
    /// fails — every slot's error is captured as an error `Response` in the
    /// returned array. Returns [`DistioError::NoAvailableSlaves`] if the
    /// target collection is empty.
    pub async fn to(&self, task_name: impl Into<String> + Clone, payload: serde_json::Value) -> Result<TellOutcome, DistioError> {
        match &self.target {
            TellTarget::One(handle) => {
                let resp = handle.dispatch(task_name, payload).await?;
                Ok(TellOutcome::Single(resp))
            }
            TellTarget::Many(handles) => {
                if handles.is_empty() {
                    return Err(DistioError::NoAvailableSlaves);
                }
                let futures = handles.iter().map(|h| {
                    let task_name = task_name.clone();
                    let payload = payload.clone();
                    async move { h.dispatch(task_name, payload).await }
                });
                let results: Vec<Result<Response, DistioError>> = futures_util::future::join_all(futures).await;

                if self.catch_all {
                    let responses = results
                        .into_iter()
                        .zip(handles.iter())
                        .map(|(r, h)| match r {
                            Ok(resp) => resp,
                            Err(e) => Response::err(0, h.id, "tell", chrono::Utc::now(), distio_core::response::ResponseError::from(&e)),
                        })
                        .collect();
                    Ok(TellOutcome::Many(ResponseArray::new(responses)))
                } else {
                    let mut responses = Vec::with_capacity(results.len());
                    for r in results {
                        responses.push(r?);
                    }
                    Ok(TellOutcome::Many(ResponseArray::new(responses)))
                }
            }
        }
    }
}
