//! Transaction-sender prefetch pipeline.
//!
//! Recovering a transaction signer is the most expensive step of block
//! intake, so it runs on a small blocking worker pool in front of the
//! importer instead of inside it. Wrappers are stamped with a sequence
//! number on submission; a single ordering tail re-sequences worker output
//! so blocks reach the import queue in submission order.

use crate::BlockWrapper;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

type Submitted = (u64, BlockWrapper);
type Recovered = (u64, Option<BlockWrapper>);

/// Sender-recovery pipeline in front of the import queue.
pub struct SenderPrefetch {
    input: Mutex<Option<Sender<Submitted>>>,
    seq: AtomicU64,
}

impl SenderPrefetch {
    /// Spawn `workers` recovery workers and the ordering tail, all on
    /// blocking threads. Must be called inside a tokio runtime.
    pub fn spawn(
        workers: usize,
        buffer: usize,
        out: mpsc::Sender<BlockWrapper>,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (input_tx, input_rx) = bounded::<Submitted>(buffer.max(1));
        let (recovered_tx, recovered_rx) = bounded::<Recovered>(buffer.max(1));

        let mut handles = Vec::with_capacity(workers + 1);
        for id in 0..workers.max(1) {
            let rx = input_rx.clone();
            let tx = recovered_tx.clone();
            handles.push(tokio::task::spawn_blocking(move || worker_loop(id, rx, tx)));
        }
        drop(recovered_tx);
        handles.push(tokio::task::spawn_blocking(move || {
            ordering_loop(recovered_rx, out)
        }));

        (
            Self {
                input: Mutex::new(Some(input_tx)),
                seq: AtomicU64::new(0),
            },
            handles,
        )
    }

    /// Pipeline that accepts nothing; used when sync is disabled.
    pub fn disabled() -> Self {
        Self {
            input: Mutex::new(None),
            seq: AtomicU64::new(0),
        }
    }

    /// Queue wrappers for recovery, blocking while the buffer is full.
    ///
    /// Submission order is preserved all the way to the import queue.
    pub fn push_all(&self, wrappers: Vec<BlockWrapper>) {
        let guard = self.input.lock();
        let Some(input) = guard.as_ref() else {
            // Shut down or disabled; blocks will be re-requested upstream.
            return;
        };
        for wrapper in wrappers {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed);
            if input.send((seq, wrapper)).is_err() {
                break;
            }
        }
    }

    /// Stop accepting input. Workers drain what was submitted, the tail
    /// flushes, and the import-queue sender held by the tail is dropped.
    pub fn close(&self) {
        self.input.lock().take();
    }
}

fn worker_loop(id: usize, rx: Receiver<Submitted>, tx: Sender<Recovered>) {
    while let Ok((seq, wrapper)) = rx.recv() {
        let mut recovered = true;
        for tx_in_block in &wrapper.block.transactions {
            if tx_in_block.sender().is_none() {
                recovered = false;
                break;
            }
        }
        let out = if recovered {
            Some(wrapper)
        } else {
            // The block will come back through gap detection if it matters.
            error!(
                number = wrapper.number(),
                hash = %wrapper.block.hash(),
                "Sender recovery failed, dropping block"
            );
            None
        };
        if tx.send((seq, out)).is_err() {
            break;
        }
    }
    debug!(worker = id, "Sender prefetch worker stopped");
}

/// Release recovered wrappers strictly in sequence order.
fn ordering_loop(rx: Receiver<Recovered>, out: mpsc::Sender<BlockWrapper>) {
    let mut next = 0u64;
    let mut pending: BTreeMap<u64, Option<BlockWrapper>> = BTreeMap::new();
    while let Ok((seq, wrapper)) = rx.recv() {
        pending.insert(seq, wrapper);
        while let Some(slot) = pending.remove(&next) {
            if let Some(wrapper) = slot {
                if out.blocking_send(wrapper).is_err() {
                    return;
                }
            }
            next += 1;
        }
    }
    debug!("Sender prefetch ordering stage stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::{Block, BlockHeader, Signature, Transaction, H256, U256};
    use ember_network::PeerId;

    fn block(number: u64, transactions: Vec<Transaction>) -> BlockWrapper {
        let header = BlockHeader::new(
            H256::repeat_byte(number as u8),
            number,
            U256::from(0x20000),
            number,
            vec![],
        );
        BlockWrapper::backfill(Block::new(header, transactions), PeerId::from_bytes(vec![9]))
    }

    fn unrecoverable_tx() -> Transaction {
        Transaction::new(
            0,
            U256::zero(),
            21_000,
            None,
            U256::zero(),
            vec![],
            Signature::new(0, H256::zero(), H256::zero()),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn preserves_submission_order_across_workers() {
        let (out_tx, mut out_rx) = mpsc::channel(256);
        let (pipeline, handles) = SenderPrefetch::spawn(4, 16, out_tx);

        let wrappers: Vec<BlockWrapper> = (1..=50).map(|n| block(n, vec![])).collect();
        let expected: Vec<u64> = wrappers.iter().map(BlockWrapper::number).collect();
        pipeline.push_all(wrappers);

        let mut got = Vec::new();
        for _ in 0..50 {
            got.push(out_rx.recv().await.expect("pipeline output").number());
        }
        assert_eq!(got, expected);

        pipeline.close();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn drops_blocks_with_unrecoverable_senders() {
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let (pipeline, handles) = SenderPrefetch::spawn(2, 8, out_tx);

        pipeline.push_all(vec![
            block(1, vec![]),
            block(2, vec![unrecoverable_tx()]),
            block(3, vec![]),
        ]);
        pipeline.close();

        let mut got = Vec::new();
        while let Some(wrapper) = out_rx.recv().await {
            got.push(wrapper.number());
        }
        assert_eq!(got, vec![1, 3]);

        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn close_stops_the_whole_pipeline() {
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let (pipeline, handles) = SenderPrefetch::spawn(2, 8, out_tx);

        pipeline.close();
        pipeline.push_all(vec![block(1, vec![])]);

        assert!(out_rx.recv().await.is_none());
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
