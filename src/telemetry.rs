const BATCH_MEMBERS_MAX: u64 = 4096;

/// Counts per bucket, where bucket `i` holds values `<= buckets[i]` and the
/// last bucket also absorbs anything larger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    buckets: Vec<u64>,
    counts: Vec<u64>,
}

impl Histogram {
    pub fn canonical(max_value: u64) -> Self {
        let mut buckets = Vec::new();
        let mut current = 1u64;
        while current < max_value {
            buckets.push(current);
            current = (current as f64 * 1.5).ceil() as u64;
        }
        buckets.push(max_value);
        let counts = vec![0; buckets.len()];
        Self { buckets, counts }
    }

    pub fn observe(&mut self, value: u64) {
        let idx = self
            .buckets
            .iter()
            .position(|bucket| value <= *bucket)
            .unwrap_or(self.buckets.len() - 1);
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    pub fn buckets(&self) -> &[u64] {
        &self.buckets
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }
}

/// Batching counters recorded by a coalescing writer under its batch lock.
#[derive(Debug, Clone)]
pub struct WriterMetrics {
    appends: u64,
    append_bytes: u64,
    timers_armed: u64,
    timer_arm_failures: u64,
    flushes: u64,
    flush_failures: u64,
    flushed_bytes: u64,
    flush_micros: u64,
    largest_batch: u64,
    batch_members: Histogram,
}

impl Default for WriterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl WriterMetrics {
    pub fn new() -> Self {
        Self {
            appends: 0,
            append_bytes: 0,
            timers_armed: 0,
            timer_arm_failures: 0,
            flushes: 0,
            flush_failures: 0,
            flushed_bytes: 0,
            flush_micros: 0,
            largest_batch: 0,
            batch_members: Histogram::canonical(BATCH_MEMBERS_MAX),
        }
    }

    pub fn record_append(&mut self, bytes: usize) {
        self.appends = self.appends.saturating_add(1);
        self.append_bytes = self.append_bytes.saturating_add(bytes as u64);
    }

    pub fn record_timer_armed(&mut self) {
        self.timers_armed = self.timers_armed.saturating_add(1);
    }

    pub fn record_timer_arm_failure(&mut self) {
        self.timer_arm_failures = self.timer_arm_failures.saturating_add(1);
    }

    pub fn record_flush(&mut self, members: usize, bytes: usize, micros: u64, ok: bool) {
        self.flushes = self.flushes.saturating_add(1);
        self.flush_micros = self.flush_micros.saturating_add(micros);
        if ok {
            self.flushed_bytes = self.flushed_bytes.saturating_add(bytes as u64);
        } else {
            self.flush_failures = self.flush_failures.saturating_add(1);
        }
        self.largest_batch = self.largest_batch.max(members as u64);
        self.batch_members.observe(members as u64);
    }

    pub fn snapshot(&self) -> WriterTelemetry {
        WriterTelemetry {
            appends: self.appends,
            append_bytes: self.append_bytes,
            timers_armed: self.timers_armed,
            timer_arm_failures: self.timer_arm_failures,
            flushes: self.flushes,
            flush_failures: self.flush_failures,
            flushed_bytes: self.flushed_bytes,
            flush_micros: self.flush_micros,
            largest_batch: self.largest_batch,
            batch_members: self.batch_members.clone(),
        }
    }
}

/// Point-in-time copy of a writer's counters.
#[derive(Debug, Clone)]
pub struct WriterTelemetry {
    pub appends: u64,
    pub append_bytes: u64,
    pub timers_armed: u64,
    pub timer_arm_failures: u64,
    pub flushes: u64,
    pub flush_failures: u64,
    pub flushed_bytes: u64,
    pub flush_micros: u64,
    pub largest_batch: u64,
    pub batch_members: Histogram,
}

impl WriterTelemetry {
    /// Mean members per flushed batch, or zero before the first flush.
    pub fn mean_batch(&self) -> f64 {
        if self.flushes == 0 {
            0.0
        } else {
            self.appends as f64 / self.flushes as f64
        }
    }
}
