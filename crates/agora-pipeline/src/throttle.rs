//! Probabilistic admission for scheduled runs.
//!
//! The throttle setting is a percentage: 100 admits every scheduled run, 0
//! admits none, anything in between admits that share of runs on average.
//! Manual triggers never consult the gate.

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info, warn};

use agora_storage::{SettingsReader, THROTTLE_SETTING_KEY};

/// Setting used when the stored value is absent or unreadable.
pub const DEFAULT_THROTTLE: f64 = 100.0;

/// Decides whether a scheduled run proceeds.
#[derive(Clone)]
pub struct ThrottleGate {
    settings: Arc<dyn SettingsReader>,
}

impl ThrottleGate {
    pub fn new(settings: Arc<dyn SettingsReader>) -> Self {
        Self { settings }
    }

    /// Effective throttle percentage. Fails open to [`DEFAULT_THROTTLE`].
    pub async fn current_setting(&self) -> f64 {
        match self.settings.read_setting(THROTTLE_SETTING_KEY).await {
            Ok(Some(raw)) => match raw.trim().parse::<f64>() {
                Ok(value) if value.is_finite() => value,
                _ => {
                    warn!(value = %raw, "Unparseable throttle setting, running unthrottled");
                    DEFAULT_THROTTLE
                }
            },
            Ok(None) => DEFAULT_THROTTLE,
            Err(e) => {
                warn!(error = %e, "Failed to read throttle setting, running unthrottled");
                DEFAULT_THROTTLE
            }
        }
    }

    /// Decide with thread-local randomness.
    pub async fn should_run(&self, job_name: &str) -> bool {
        let setting = self.current_setting().await;
        decide(job_name, setting, &mut rand::thread_rng())
    }

    /// Decide with caller-supplied randomness.
    pub async fn should_run_with<R: Rng + Send>(&self, job_name: &str, rng: &mut R) -> bool {
        let setting = self.current_setting().await;
        decide(job_name, setting, rng)
    }
}

/// Admission decision for one run given a throttle percentage.
pub fn decide<R: Rng + ?Sized>(job_name: &str, setting: f64, rng: &mut R) -> bool {
    if setting >= 100.0 {
        debug!(job = job_name, throttle = setting, decision = true, "Throttle open");
        return true;
    }
    if setting <= 0.0 {
        info!(
            job = job_name,
            throttle = setting,
            decision = false,
            "Throttle closed, skipping run"
        );
        return false;
    }

    let draw: f64 = rng.gen_range(0.0..100.0);
    let decision = draw < setting;
    info!(
        job = job_name,
        throttle = setting,
        draw,
        decision,
        "Throttle decision"
    );
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_storage::{MemoryStore, StoreOp};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gate_with(value: Option<&str>) -> (ThrottleGate, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        if let Some(v) = value {
            store.put_setting(THROTTLE_SETTING_KEY, v);
        }
        (ThrottleGate::new(store.clone()), store)
    }

    #[test]
    fn test_full_setting_always_runs() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!((0..1000).all(|_| decide("job", 100.0, &mut rng)));
        assert!((0..1000).all(|_| decide("job", 250.0, &mut rng)));
    }

    #[test]
    fn test_zero_setting_never_runs() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!((0..1000).all(|_| !decide("job", 0.0, &mut rng)));
        assert!((0..1000).all(|_| !decide("job", -5.0, &mut rng)));
    }

    #[test]
    fn test_partial_setting_converges() {
        let mut rng = StdRng::seed_from_u64(42);
        let trials = 20_000;
        let admitted = (0..trials).filter(|_| decide("job", 30.0, &mut rng)).count();
        let rate = admitted as f64 / trials as f64;
        assert!((rate - 0.30).abs() < 0.02, "admission rate {rate}");
    }

    #[tokio::test]
    async fn test_missing_setting_fails_open() {
        let (gate, _) = gate_with(None);
        assert_eq!(gate.current_setting().await, DEFAULT_THROTTLE);
        assert!(gate.should_run("persona_batch").await);
    }

    #[tokio::test]
    async fn test_read_failure_fails_open() {
        let (gate, store) = gate_with(Some("0"));
        store.fail_on(StoreOp::ReadSetting);
        assert_eq!(gate.current_setting().await, DEFAULT_THROTTLE);
    }

    #[tokio::test]
    async fn test_garbage_setting_fails_open() {
        let (gate, _) = gate_with(Some("lots"));
        assert_eq!(gate.current_setting().await, DEFAULT_THROTTLE);

        let (gate, _) = gate_with(Some("NaN"));
        assert_eq!(gate.current_setting().await, DEFAULT_THROTTLE);
    }

    #[tokio::test]
    async fn test_stored_setting_is_used() {
        let (gate, _) = gate_with(Some(" 0 "));
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(gate.current_setting().await, 0.0);
        assert!(!gate.should_run_with("topic_batch", &mut rng).await);
    }
}
