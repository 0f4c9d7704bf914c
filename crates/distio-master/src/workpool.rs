//! [`Workpool`] — least-busy-slave task dispatcher, per `SPEC_FULL.md` §4.7.
//!
//! Open Question resolution (see `DESIGN.md`): assignment picks the slave
//! with the fewest in-flight requests, ties broken by position in the
//! workpool's slave list (i.e. registry order), for deterministic tests.

use std::sync::Arc;

use distio_core::{DistioError, Response, ResponseArray};

use crate::slave::{SlaveHandle, SlaveState};

/// An ordered set of slaves plus the least-busy assignment policy used by
/// [`Workpool::do_task`].
pub struct Workpool {
    slaves: Vec<Arc<SlaveHandle>>,
}

impl Workpool {
    pub fn new(slaves: Vec<Arc<SlaveHandle>>) -> Self {
        Self { slaves }
    }

    /// Pick the available slave with the fewest in-flight requests, ties
    /// broken by position in `self.slaves`.
    ///
    /// # Errors
    ///
    /// Returns [`DistioError::NoAvailableSlaves`] if every slave is
    /// `Closed` or `Errored`.
    async fn pick(&self) -> Result<Arc<SlaveHandle>, DistioError> {
        let mut best: Option<(Arc<SlaveHandle>, usize)> = None;
        for slave in &self.slaves {
            let state = slave.state().await;
            if matches!(state, SlaveState::Closed | SlaveState::Errored) {
                continue;
            }
            let in_flight = slave.in_flight().await;
            match &best {
                Some((_, best_count)) if *best_count <= in_flight => {}
                _ => best = Some((Arc::clone(slave), in_flight)),
            }
        }
        best.map(|(slave, _)| slave).ok_or(DistioError::NoAvailableSlaves)
    }

    /// Dispatch one `task_name`/`payload` to the currently least-busy
    /// available slave.
    ///
    /// # Errors
    ///
    /// Returns [`DistioError::NoAvailableSlaves`] if the set is empty or
    /// every slave is `Closed`/`Errored`; otherwise propagates that slave's
    /// `dispatch` error.
    pub async fn do_task(&self, task_name: impl Into<String>, payload: serde_json::Value) -> Result<Response, DistioError> {
        let slave = self.pick().await?;
        slave.dispatch(task_name, payload).await
    }

    /// Repeatedly call [`Workpool::do_task`] for `i = 0, 1, 2, …` while
    /// `predicate(i)` holds, evaluated before each dispatch, collecting
    /// responses in call order.
    ///
    /// # Errors
    ///
    /// Returns the first `do_task` error encountered; responses already
    /// collected before that point are discarded along with it (the loop
    /// aborts, it does not return partial results).
    pub async fn while_loop(
        &self,
        mut predicate: impl FnMut(usize) -> bool,
        task_name: impl Into<String> + Clone,
        payload: serde_json::Value,
    ) -> Result<ResponseArray, DistioError> {
        let mut responses = Vec::new();
        let mut i = 0;
        while predicate(i) {
            let resp = self.do_task(task_name.clone(), payload.clone()).await?;
            responses.push(resp);
            i += 1;
        }
        Ok(ResponseArray::new(responses))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    async fn while_loop_collects_responses_and_drains_in_flight() {
        let slaves: Vec<_> = (1..=4).map(echo_slave).collect();
        let pool = Workpool::new(slaves.clone());
        let arr = pool
            .while_loop(|i| i < 3, "echo", serde_json::json!("x"))
            .await
            .unwrap();
        assert_eq!(arr.len(), 3);
        for r in arr.iter() {
            assert_eq!(r.value, Some(serde_json::json!("x")));
        }
        for slave in &slaves {
            assert_eq!(slave.in_flight().await, 0);
        }
    }

    #[tokio::test]
    async fn while_false_predicate_dispatches_nothing() {
        let slaves: Vec<_> = (1..=2).map(echo_slave).collect();
        let pool = Workpool::new(slaves);
        let arr = pool.while_loop(|_| false, "echo", serde_json::json!("x")).await.unwrap();
        assert!(arr.is_empty());
    }

    #[tokio::test]
    async fn empty_set_fails_with_no_available_slaves() {
        let pool = Workpool::new(Vec::new());
        let err = pool.do_task("echo", serde_json::json!(1)).await.unwrap_err();
        assert!(matches!(err, DistioError::NoAvailableSlaves));
    }

    #[tokio::test]
    async fn all_closed_set_fails_with_no_available_slaves() {
        let slave = echo_slave(1);
        slave.close(std::time::Duration::from_millis(50)).await.unwrap();
        let pool = Workpool::new(vec![slave]);
        let err = pool.do_task("echo", serde_json::json!(1)).await.unwrap_err();
        assert!(matches!(err, DistioError::NoAvailableSlaves));
    }
}
