#[derive(Debug, Clone)]
pub struct QueueMetrics {
    pub active_workers: usize,
    pub idle_workers: usize,
    pub queued_items: usize,
    pub spawned_workers: usize,
    pub executed_items: usize,
    pub panicked_items: usize,
}

impl QueueMetrics {
    /// Fraction of live workers currently running the engine.
    pub fn utilization(&self) -> f64 {
        if self.active_workers == 0 {
            return 0.0;
        }
        (self.active_workers - self.idle_workers) as f64 / self.active_workers as f64
    }

    pub fn queue_pressure(&self) -> f64 {
        self.queued_items as f64
    }

    pub fn success_rate(&self) -> f64 {
        let finished = self.executed_items + self.panicked_items;
        if finished == 0 {
            return 1.0;
        }
        self.executed_items as f64 / finished as f64
    }
}
