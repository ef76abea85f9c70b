//! Answer delivery.
//!
//! Every two-way quest registers exactly one [`Callback`]. It is consumed
//! by whichever of answer, timeout sweep or close drain removes the pending
//! entry first, so it can only ever fire once.
//!
//! User callbacks run on the blocking thread pool so that a slow or
//! panicking callback never stalls the connection's I/O tasks.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use protocol::Answer;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

/// Two-method answer callback.
pub trait AnswerCallback: Send + Sync {
    /// Called with a success answer.
    fn on_answer(&self, answer: Answer);

    /// Called with an exception answer, real or synthetic
    /// (timeout, connection closed).
    fn on_exception(&self, answer: Answer, error_code: i32);
}

/// Closure receiving the answer and its error code (`OK` on success).
pub type AnswerFn = Box<dyn FnOnce(Answer, i32) + Send + 'static>;

/// How a pending request delivers its answer.
pub enum Callback {
    /// Rendezvous with a caller awaiting the answer.
    Blocking(oneshot::Sender<Answer>),
    /// Capability object with separate success and exception paths.
    Object(Arc<dyn AnswerCallback>),
    /// Single closure.
    Function(AnswerFn),
}

impl Callback {
    /// Deliver `answer`.
    pub(crate) fn invoke(self, answer: Answer, handle: &Handle) {
        match self {
            Callback::Blocking(tx) => {
                // The waiter may have given up; nothing else to notify.
                let _ = tx.send(answer);
            }
            Callback::Object(callback) => {
                handle.spawn_blocking(move || {
                    guarded("answer callback", || {
                        if answer.is_exception() {
                            let code = answer.error_code();
                            callback.on_exception(answer, code);
                        } else {
                            callback.on_answer(answer);
                        }
                    })
                });
            }
            Callback::Function(f) => {
                handle.spawn_blocking(move || {
                    guarded("answer closure", || {
                        let code = answer.error_code();
                        f(answer, code);
                    })
                });
            }
        }
    }
}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callback::Blocking(_) => f.write_str("Callback::Blocking"),
            Callback::Object(_) => f.write_str("Callback::Object"),
            Callback::Function(_) => f.write_str("Callback::Function"),
        }
    }
}

/// Run user code, logging instead of propagating a panic.
pub(crate) fn guarded<F: FnOnce()>(what: &str, f: F) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(f)) {
        tracing::error!(what, panic = %panic_message(&panic), "callback panicked");
    }
}

pub(crate) fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::error_code;
    use tokio::sync::mpsc;

    struct Recorder(mpsc::UnboundedSender<(bool, i32)>);

    impl AnswerCallback for Recorder {
        fn on_answer(&self, _answer: Answer) {
            let _ = self.0.send((true, error_code::OK));
        }

        fn on_exception(&self, _answer: Answer, error_code: i32) {
            let _ = self.0.send((false, error_code));
        }
    }

    #[tokio::test]
    async fn test_blocking_delivers_answer() {
        let (tx, rx) = oneshot::channel();
        Callback::Blocking(tx).invoke(
            Answer::error_with_seq(3, error_code::CORE_TIMEOUT, "Quest is timeout."),
            &Handle::current(),
        );
        let answer = rx.await.unwrap();
        assert_eq!(answer.seq_num(), 3);
        assert_eq!(answer.error_code(), error_code::CORE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_blocking_with_dropped_receiver() {
        let (tx, rx) = oneshot::channel();
        drop(rx);
        Callback::Blocking(tx).invoke(Answer::error_with_seq(1, 1, "x"), &Handle::current());
    }

    #[tokio::test]
    async fn test_object_routes_by_status() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let callback: Arc<dyn AnswerCallback> = Arc::new(Recorder(tx));

        let mut quest = protocol::Quest::new("echo");
        quest.set_seq_num(1);
        Callback::Object(callback.clone()).invoke(Answer::new(&quest), &Handle::current());
        assert_eq!(rx.recv().await.unwrap(), (true, error_code::OK));

        Callback::Object(callback).invoke(
            Answer::error_with_seq(2, error_code::CORE_CONNECTION_CLOSED, "Connection is closed."),
            &Handle::current(),
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            (false, error_code::CORE_CONNECTION_CLOSED)
        );
    }

    #[tokio::test]
    async fn test_function_receives_code() {
        let (tx, rx) = oneshot::channel();
        Callback::Function(Box::new(move |answer, code| {
            let _ = tx.send((answer.seq_num(), code));
        }))
        .invoke(
            Answer::error_with_seq(8, error_code::CORE_TIMEOUT, "Quest is timeout."),
            &Handle::current(),
        );
        assert_eq!(rx.await.unwrap(), (8, error_code::CORE_TIMEOUT));
    }

    #[tokio::test]
    async fn test_panicking_callback_is_contained() {
        Callback::Function(Box::new(|_, _| panic!("boom")))
            .invoke(Answer::error_with_seq(1, 1, "x"), &Handle::current());

        // The runtime keeps working after the panic.
        let (tx, rx) = oneshot::channel();
        Callback::Blocking(tx).invoke(Answer::error_with_seq(2, 1, "y"), &Handle::current());
        assert_eq!(rx.await.unwrap().seq_num(), 2);
    }

    #[test]
    fn test_panic_message() {
        let panic = panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(&panic), "static message");

        let panic = panic::catch_unwind(|| panic!("{} message", "formatted")).unwrap_err();
        assert_eq!(panic_message(&panic), "formatted message");
    }
}
