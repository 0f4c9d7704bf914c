//! `scatter(task).data(...).gather(...)` — parallel one-datum-per-dispatch
//! fan-out across a slave set, per `SPEC_FULL.md` §4.6.

use std::sync::Arc;

use distio_core::{Response, ResponseArray};

use crate::slave::SlaveHandle;

/// Begin a scatter over `task_name`.
pub fn scatter(task_name: impl Into<String>) -> ScatterBuilder {
    ScatterBuilder { task_name: task_name.into() }
}

pub struct ScatterBuilder {
    task_name: String,
}

impl ScatterBuilder {
    /// Attach the data list to fan out, one datum per dispatch.
    pub fn data(self, data: Vec<serde_json::Value>) -> ScatterWithData {
        ScatterWithData {
            task_name: self.task_name,
            data,
        }
    }
}

pub struct ScatterWithData {
    task_name: String,
    data: Vec<serde_json::Value>,
}

impl ScatterWithData {
    /// Fan out across `slaves`: the i-th datum goes to the `(i mod
    /// |slaves|)`-th slave. Every dispatch is issued before any response is
    /// awaited; the returned array preserves input-datum order regardless
    /// of completion order. Per-slave errors surface as error `Response`s
    /// rather than aborting the call.
    ///
    /// An empty data list with a non-empty slave list dispatches nothing
    /// and resolves immediately with an empty array.
    pub async fn gather(self, slaves: &[Arc<SlaveHandle>]) -> ResponseArray {
        if self.data.is_empty() || slaves.is_empty() {
            return ResponseArray::new(Vec::new());
        }

        let task_name = self.task_name;
        let n = slaves.len();
        let futures = self.data.into_iter().enumerate().map(|(i, datum)| {
            let slave = Arc::clone(&slaves[i % n]);
            let task_name = task_name.clone();
            async move {
                match slave.dispatch(task_name.clone(), datum).await {
                    Ok(resp) => resp,
                    Err(e) => Response::err(0, slave.id, task_name, chrono::Utc::now(), distio_core::response::ResponseError::from(&e)),
                }
            }
        });

        let responses: Vec<Response> = futures_util::future::join_all(futures).await;
        ResponseArray::new(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distio_core::response::{SortField, SortOrder};
    use distio_core::{Envelope, EnvelopeKind};
    use distio_transport::{InProcessTransport, Transport};

    async fn echo_peer(peer: Arc<dyn Transport>) {
        tokio::spawn(async move {
            loop {
                match peer.recv().await {
                    Ok(env) if env.kind == EnvelopeKind::Request => {
                        let reply = Envelope::response(env.request_id, env.task_name, env.payload, 99);
                        if peer.send(reply).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        });
    }

    fn echo_slave(id: u64) -> Arc<SlaveHandle> {
        let (master_side, slave_side) = InProcessTransport::pair();
        tokio::spawn(echo_peer(Arc::new(slave_side)));
        SlaveHandle::new(id, id, None, false, Arc::new(master_side))
    }

    #[tokio::test]
    async fn scatter_echo_preserves_order_and_supports_sort_join() {
        let s0 = echo_slave(1);
        let s1 = echo_slave(2);
        let arr = scatter("echo")
            .data(vec![serde_json::json!("hello"), serde_json::json!("world")])
            .gather(&[s0, s1])
            .await;

        let values: Vec<_> = arr.iter().map(|r| r.value.clone().unwrap()).collect();
        assert_eq!(values, vec![serde_json::json!("hello"), serde_json::json!("world")]);

        let sorted = arr.clone().sort_by(SortField::Value, SortOrder::Desc);
        let sorted_values: Vec<_> = sorted.iter().map(|r| r.value.clone().unwrap()).collect();
        assert_eq!(sorted_values, vec![serde_json::json!("world"), serde_json::json!("hello")]);

        assert_eq!(arr.join_values(", "), "hello, world");
    }

    #[tokio::test]
    async fn empty_data_with_nonempty_slaves_dispatches_nothing() {
        let s0 = echo_slave(1);
        let arr = scatter("echo").data(vec![]).gather(&[s0]).await;
        assert!(arr.is_empty());
    }

    #[tokio::test]
    async fn datum_count_exceeding_slave_count_wraps_with_modulo() {
        let s0 = echo_slave(1);
        let s1 = echo_slave(2);
        let arr = scatter("echo")
            .data(vec![serde_json::json!(0), serde_json::json!(1), serde_json::json!(2)])
            .gather(&[s0.clone(), s1.clone()])
            .await;
        let slave_ids: Vec<_> = arr.iter().map(|r| r.slave_id).collect();
        assert_eq!(slave_ids, vec![s0.id, s1.id, s0.id]);
    }
}
