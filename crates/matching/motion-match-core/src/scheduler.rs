//! Cooperative query loop for one character.
//!
//! The host advances the loop with elapsed time. Due ticks run one after another,
//! each to completion (including handing its transition request to playback),
//! and the next tick is scheduled `query_rate` later, or `idle_delay` later after
//! an idle tick. Stopping only prevents further ticks from being scheduled.

use std::sync::Arc;

use log::debug;

use crate::config::Config;
use crate::database::FeatureDatabase;
use crate::engine::{Matcher, Tick, TickOutcome};
use crate::error::Result;
use crate::live::{LiveMotionSource, PlaybackSink};

#[derive(Debug, Clone)]
pub struct QueryLoop {
    matcher: Matcher,
    /// Loop-local clock in seconds.
    clock: f64,
    next_due: f64,
    running: bool,
    ticks: u64,
}

impl QueryLoop {
    /// Wrap a matcher; the first tick is due immediately.
    pub fn new(matcher: Matcher) -> Self {
        Self {
            matcher,
            clock: 0.0,
            next_due: 0.0,
            running: true,
            ticks: 0,
        }
    }

    /// Build a matcher over `db` and wrap it. Fails with `EmptyDatabase` on an empty database.
    pub fn with_database(db: Arc<FeatureDatabase>, cfg: Config) -> Result<Self> {
        Ok(Self::new(Matcher::new(db, cfg)?))
    }

    /// Ask playback to start the matcher's current pose.
    pub fn start(&mut self, sink: &mut dyn PlaybackSink) -> Result<()> {
        let request = self.matcher.initial_request()?;
        sink.request_transition(&request);
        self.running = true;
        Ok(())
    }

    /// Advance the clock by `dt` seconds and run every tick that became due.
    pub fn advance(
        &mut self,
        dt: f32,
        live: &dyn LiveMotionSource,
        sink: &mut dyn PlaybackSink,
    ) -> Vec<Tick> {
        let mut ran = Vec::new();
        if !self.running {
            return ran;
        }
        self.clock += f64::from(dt.max(0.0));

        while self.running && self.clock >= self.next_due {
            let tick = self.matcher.tick(live);
            if let Some(request) = &tick.request {
                sink.request_transition(request);
            }
            let delay = match tick.outcome {
                TickOutcome::Idle => self.matcher.config().idle_delay,
                _ => self.matcher.config().query_rate,
            };
            self.next_due += f64::from(delay);
            self.ticks += 1;
            debug!(
                "query loop: tick {} {:?}, next at {:.3}s",
                self.ticks, tick.outcome, self.next_due
            );
            ran.push(tick);
        }
        ran
    }

    /// Stop scheduling ticks. A tick never stops midway.
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn ticks_run(&self) -> u64 {
        self.ticks
    }

    /// Seconds until the next tick is due (zero when overdue).
    pub fn time_until_next_tick(&self) -> f32 {
        (self.next_due - self.clock).max(0.0) as f32
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }
}
