use std::{
    io,
    sync::mpsc::{self, RecvTimeoutError},
    thread::{self, JoinHandle},
    time::Duration,
};

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(150);

/// Collapses bursts of values into a single emission of the last one, once
/// no new value has arrived for the quiet period.
pub struct Debouncer<T: Send + 'static> {
    tx: Option<mpsc::Sender<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn spawn<F>(quiet: Duration, mut emit: F) -> io::Result<Self>
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<T>();
        let worker = thread::Builder::new()
            .name("island-debounce".into())
            .spawn(move || {
                while let Ok(mut latest) = rx.recv() {
                    loop {
                        match rx.recv_timeout(quiet) {
                            Ok(value) => latest = value,
                            Err(RecvTimeoutError::Timeout) => {
                                emit(latest);
                                break;
                            }
                            // Flush what we have on shutdown.
                            Err(RecvTimeoutError::Disconnected) => {
                                emit(latest);
                                return;
                            }
                        }
                    }
                }
            })?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    pub fn push(&self, value: T) {
        if let Some(tx) = self.tx.as_ref() {
            if tx.send(value).is_err() {
                log::warn!("debounce worker is gone; value dropped");
            }
        }
    }
}

impl<T: Send + 'static> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
