pub fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

pub fn default_queue_capacity() -> usize {
    65_536
}

pub fn default_halt_backoff_ms() -> u64 {
    100
}

pub fn default_idle_spins() -> u32 {
    64
}

pub fn default_idle_sleep_us() -> u64 {
    50
}

pub fn default_snapshot_depth() -> usize {
    20
}

pub fn default_worker_thread_name() -> String {
    "matching-worker".to_string()
}

pub fn default_log_format() -> String {
    "pretty".to_string()
}

pub fn default_metrics_port() -> u16 {
    9100
}
