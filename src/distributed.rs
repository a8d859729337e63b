//! Collective reduction between cooperating processes.
//!
//! Distributed integrations run the same schedule on every member of a [`ProcessGroup`]. After
//! each iteration every member packs its local sums into a [`Reduction`], the group adds all
//! records element-wise and every member unpacks the identical totals. There is no coordinator:
//! every member performs the same combination and therefore ends up in the same state.
use crate::core::error::Error;
use crossbeam::channel::{self, Receiver, Sender};
use log::trace;
use num_traits::Float;
use std::time::Duration;

/// A fixed-shape record of floating-point sums and integer counts that is summed element-wise
/// over all members of a [`ProcessGroup`].
#[derive(Clone, Debug, PartialEq)]
pub struct Reduction<T> {
    values: Vec<T>,
    counts: Vec<u64>,
    next_value: usize,
    next_count: usize,
}

impl<T: Float> Default for Reduction<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Float> Reduction<T> {
    /// Constructor for an empty record.
    pub const fn new() -> Self {
        Self {
            values: Vec::new(),
            counts: Vec::new(),
            next_value: 0,
            next_count: 0,
        }
    }

    /// Returns the floating-point part of the record.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Returns the floating-point part of the record for in-place reduction.
    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// Returns the integer part of the record.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Returns the integer part of the record for in-place reduction.
    pub fn counts_mut(&mut self) -> &mut [u64] {
        &mut self.counts
    }

    /// Adds `other` element-wise to this record.
    pub fn add_assign(&mut self, other: &Self) -> Result<(), Error> {
        if self.values.len() != other.values.len() || self.counts.len() != other.counts.len() {
            return Err(Error::Coordination(format!(
                "records of different shapes: ({}, {}) and ({}, {})",
                self.values.len(),
                self.counts.len(),
                other.values.len(),
                other.counts.len()
            )));
        }

        for (lhs, rhs) in self.values.iter_mut().zip(&other.values) {
            *lhs = *lhs + *rhs;
        }

        for (lhs, rhs) in self.counts.iter_mut().zip(&other.counts) {
            *lhs += *rhs;
        }

        Ok(())
    }

    pub(crate) fn push_value(&mut self, value: T) {
        self.values.push(value);
    }

    pub(crate) fn push_values(&mut self, values: &[T]) {
        self.values.extend_from_slice(values);
    }

    pub(crate) fn push_count(&mut self, count: usize) {
        self.counts.push(count as u64);
    }

    pub(crate) fn next_value(&mut self) -> T {
        let value = self.values[self.next_value];
        self.next_value += 1;
        value
    }

    pub(crate) fn next_values(&mut self, n: usize) -> Vec<T> {
        let values = self.values[self.next_value..self.next_value + n].to_vec();
        self.next_value += n;
        values
    }

    pub(crate) fn next_count(&mut self) -> usize {
        let count = self.counts[self.next_count];
        self.next_count += 1;
        count as usize
    }

    fn rewind(&mut self) {
        self.next_value = 0;
        self.next_count = 0;
    }
}

/// A fixed set of cooperating processes that can sum a [`Reduction`] over all its members.
///
/// `all_reduce` is a barrier: it returns only after every member has contributed. A member that
/// never arrives is fatal for the whole run and must be reported as [`Error::Coordination`].
pub trait ProcessGroup<T> {
    /// The zero-based index of this member.
    fn rank(&self) -> usize;

    /// The number of members.
    fn size(&self) -> usize;

    /// Replaces `reduction` with the element-wise sum of the records of all members.
    fn all_reduce(&self, reduction: &mut Reduction<T>) -> Result<(), Error>;
}

/// The trivial group consisting of the calling process only.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleProcess;

impl<T: Float> ProcessGroup<T> for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce(&self, reduction: &mut Reduction<T>) -> Result<(), Error> {
        reduction.rewind();
        Ok(())
    }
}

/// Members of an in-process group, typically one per thread, that exchange their records over
/// channels. Every member sends its record to every other member and adds all records in rank
/// order, so all members compute bit-identical sums.
#[derive(Debug)]
pub struct ThreadGroup<T> {
    rank: usize,
    senders: Vec<Option<Sender<Reduction<T>>>>,
    receivers: Vec<Option<Receiver<Reduction<T>>>>,
    timeout: Option<Duration>,
}

impl<T: Float + Send> ThreadGroup<T> {
    /// Creates the `size` members of a new group. Member `i` of the returned vector has rank `i`.
    pub fn new(size: usize) -> Vec<Self> {
        Self::create(size, None)
    }

    /// Like [`ThreadGroup::new`], but a member waiting longer than `timeout` for a peer gives up
    /// with [`Error::Coordination`].
    pub fn with_timeout(size: usize, timeout: Duration) -> Vec<Self> {
        Self::create(size, Some(timeout))
    }

    fn create(size: usize, timeout: Option<Duration>) -> Vec<Self> {
        let mut members: Vec<_> = (0..size)
            .map(|rank| Self {
                rank,
                senders: (0..size).map(|_| None).collect(),
                receivers: (0..size).map(|_| None).collect(),
                timeout,
            })
            .collect();

        for from in 0..size {
            for to in 0..size {
                if from != to {
                    let (sender, receiver) = channel::unbounded();
                    members[from].senders[to] = Some(sender);
                    members[to].receivers[from] = Some(receiver);
                }
            }
        }

        members
    }

    fn receive(
        &self,
        peer: usize,
        receiver: &Receiver<Reduction<T>>,
    ) -> Result<Reduction<T>, Error> {
        let received = match self.timeout {
            Some(timeout) => receiver.recv_timeout(timeout).map_err(|e| e.to_string()),
            None => receiver.recv().map_err(|e| e.to_string()),
        };

        received.map_err(|e| {
            Error::Coordination(format!(
                "rank {} did not receive the record of rank {}: {}",
                self.rank, peer, e
            ))
        })
    }
}

impl<T: Float + Send> ProcessGroup<T> for ThreadGroup<T> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn all_reduce(&self, reduction: &mut Reduction<T>) -> Result<(), Error> {
        for (peer, sender) in self.senders.iter().enumerate() {
            if let Some(sender) = sender {
                sender.send(reduction.clone()).map_err(|_| {
                    Error::Coordination(format!(
                        "rank {} left the group before rank {} could send its record",
                        peer, self.rank
                    ))
                })?;
            }
        }

        let mut total: Option<Reduction<T>> = None;

        for (peer, receiver) in self.receivers.iter().enumerate() {
            let record = match receiver {
                Some(receiver) => self.receive(peer, receiver)?,
                None => reduction.clone(),
            };

            match total.as_mut() {
                Some(total) => total.add_assign(&record)?,
                None => total = Some(record),
            }
        }

        if let Some(mut total) = total {
            total.rewind();
            *reduction = total;
        }

        trace!(
            "rank {} reduced {} values and {} counts",
            self.rank,
            reduction.values.len(),
            reduction.counts.len()
        );

        Ok(())
    }
}

#[cfg(feature = "mpi")]
mod mpi_group {
    use super::{ProcessGroup, Reduction};
    use crate::core::error::Error;
    use mpi::collective::SystemOperation;
    use mpi::datatype::Equivalence;
    use mpi::topology::{Communicator, SimpleCommunicator};
    use mpi::traits::*;
    use num_traits::Float;

    impl<T: Equivalence + Float> ProcessGroup<T> for SimpleCommunicator {
        fn rank(&self) -> usize {
            Communicator::rank(self) as usize
        }

        fn size(&self) -> usize {
            Communicator::size(self) as usize
        }

        fn all_reduce(&self, reduction: &mut Reduction<T>) -> Result<(), Error> {
            let mut values = vec![T::zero(); reduction.values().len()];
            self.all_reduce_into(reduction.values(), &mut values[..], SystemOperation::sum());
            reduction.values_mut().copy_from_slice(&values);

            let mut counts = vec![0_u64; reduction.counts().len()];
            self.all_reduce_into(reduction.counts(), &mut counts[..], SystemOperation::sum());
            reduction.counts_mut().copy_from_slice(&counts);

            reduction.rewind();

            Ok(())
        }
    }
}
