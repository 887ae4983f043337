//! Timer queries.
//!
//! A session records at most `Settings::max_timer_queries` timer queries between two
//! gathers. Query objects are created the first time a slot of the ring is used and
//! reused afterwards.

use crate::backends::{BackendId, QueryKind, Visitor};
use crate::errors::*;

use super::{Session, READY};

/// How long to wait for the result of a query.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum QueryWait {
    /// Returns immediately.
    Poll,
    /// Spins until the result is available, or until `Settings::spin_limit` polls.
    Block,
    /// Gives up after the given number of polls.
    Attempts(u32),
}

/// Reads the result of `query` according to `mode`.
pub(crate) fn wait(
    visitor: &mut dyn Visitor,
    query: BackendId,
    mode: QueryWait,
    spin_limit: Option<u32>,
) -> Result<Option<u64>> {
    match mode {
        QueryWait::Poll => visitor.poll_query(query),
        QueryWait::Attempts(n) => {
            for _ in 0..n.max(1) {
                if let Some(v) = visitor.poll_query(query)? {
                    return Ok(Some(v));
                }
            }

            Ok(None)
        }
        QueryWait::Block => {
            let mut polls = 0;
            loop {
                if let Some(v) = visitor.poll_query(query)? {
                    return Ok(Some(v));
                }

                polls += 1;
                if let Some(limit) = spin_limit {
                    if polls >= limit {
                        warn!("Gave up waiting for a query after {} polls.", polls);
                        return Ok(None);
                    }
                }
            }
        }
    }
}

struct Slot {
    id: BackendId,
    kind: QueryKind,
}

pub(crate) struct TimerQueries {
    capacity: usize,
    slots: Vec<Slot>,
    used: usize,
    open: Option<usize>,
}

impl TimerQueries {
    pub fn new(capacity: usize) -> Self {
        TimerQueries {
            capacity,
            slots: Vec::new(),
            used: 0,
            open: None,
        }
    }

    /// Takes the next slot of the ring, with a query object of `kind`.
    fn next(&mut self, visitor: &mut dyn Visitor, kind: QueryKind) -> Result<BackendId> {
        if self.used >= self.capacity {
            bail_format!(
                InvalidOperation,
                "Only {} timer queries could be recorded between gathers.",
                self.capacity
            );
        }

        if self.used == self.slots.len() {
            let id = visitor.create_query(kind)?;
            self.slots.push(Slot { id, kind });
        } else if self.slots[self.used].kind != kind {
            let id = visitor.create_query(kind)?;
            let prev = ::std::mem::replace(&mut self.slots[self.used], Slot { id, kind });
            visitor.delete_query(prev.id)?;
        }

        self.used += 1;
        Ok(self.slots[self.used - 1].id)
    }

    fn begin(&mut self, visitor: &mut dyn Visitor) -> Result<()> {
        if self.open.is_some() {
            bail_format!(InvalidOperation, "A timer query is already open.");
        }

        let id = self.next(visitor, QueryKind::TimeElapsed)?;
        visitor.begin_query(id)?;
        self.open = Some(self.used - 1);
        Ok(())
    }

    fn end(&mut self, visitor: &mut dyn Visitor) -> Result<()> {
        match self.open.take() {
            Some(i) => visitor.end_query(self.slots[i].id),
            None => Err(err_format!(InvalidOperation, "No timer query is open.")),
        }
    }

    fn timestamp(&mut self, visitor: &mut dyn Visitor) -> Result<()> {
        let id = self.next(visitor, QueryKind::Timestamp)?;
        visitor.timestamp(id)
    }

    fn gather(
        &mut self,
        visitor: &mut dyn Visitor,
        mode: QueryWait,
        spin_limit: Option<u32>,
    ) -> Result<Option<Vec<u64>>> {
        if self.used == 0 {
            bail_format!(InvalidOperation, "No timer query was recorded.");
        }

        if self.open.is_some() {
            bail_format!(InvalidOperation, "A timer query is still open.");
        }

        // Queries complete in order, once the last one is ready the others are too.
        let last = self.slots[self.used - 1].id;
        let last = match wait(visitor, last, mode, spin_limit)? {
            Some(v) => v,
            None => return Ok(None),
        };

        let mut values = Vec::with_capacity(self.used);
        for v in &self.slots[..self.used - 1] {
            match wait(visitor, v.id, QueryWait::Block, spin_limit)? {
                Some(v) => values.push(v),
                None => return Ok(None),
            }
        }

        values.push(last);
        self.used = 0;
        Ok(Some(values))
    }

    /// Deletes every query object.
    pub fn release(&mut self, visitor: &mut dyn Visitor) {
        for v in self.slots.drain(..) {
            if let Err(err) = visitor.delete_query(v.id) {
                warn!("{}", err);
            }
        }

        self.used = 0;
        self.open = None;
    }
}

impl Session {
    /// Starts measuring the GPU time of the commands issued until `end_timer_query`.
    pub fn begin_timer_query(&mut self) -> Result<()> {
        self.tracked(|s| {
            s.expect_stage(READY)?;
            s.timers.begin(&mut *s.visitor)
        })
    }

    pub fn end_timer_query(&mut self) -> Result<()> {
        self.tracked(|s| {
            s.expect_stage(READY)?;
            s.timers.end(&mut *s.visitor)
        })
    }

    /// Records the GPU time once every previous command is done.
    pub fn timestamp_query(&mut self) -> Result<()> {
        self.tracked(|s| {
            s.expect_stage(READY)?;
            s.timers.timestamp(&mut *s.visitor)
        })
    }

    /// Reads the results of every timer query recorded since the last gather, in
    /// recording order. Returns `None` if they are not available within `mode`, in
    /// which case they are kept for the next gather.
    pub fn gather_timers(&mut self, mode: QueryWait) -> Result<Option<Vec<u64>>> {
        self.tracked(move |s| {
            s.expect_stage(READY)?;
            let spin_limit = s.settings.spin_limit;
            s.timers.gather(&mut *s.visitor, mode, spin_limit)
        })
    }
}
