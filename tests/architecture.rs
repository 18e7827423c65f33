//! Architecture Verification Suite
//!
//! Thread-safety guarantees the front-end and the allocator thread rely on.

#[cfg(test)]
mod architecture_tests {
    use hydra_hog::clock::{ManualClock, SystemClock};
    use hydra_hog::memory::MemoryPressure;
    use hydra_hog::telemetry::{FixedProbe, NoSensors, SysinfoProbe, SysinfoSensors};
    use hydra_hog::worker::{ExecSpawner, OsWorkerProcess, SharedFlag};

    // Injected collaborators are shared behind Arc
    #[test]
    fn test_collaborators_are_thread_safe() {
        fn assert_send_sync<T: Send + Sync>() {}

        assert_send_sync::<SystemClock>();
        assert_send_sync::<ManualClock>();
        assert_send_sync::<ExecSpawner>();
        assert_send_sync::<SysinfoSensors>();
        assert_send_sync::<NoSensors>();
        assert_send_sync::<SysinfoProbe>();
        assert_send_sync::<FixedProbe>();
        assert_send_sync::<SharedFlag>();
    }

    // The supervisor and what it owns can move to another thread
    #[test]
    fn test_run_state_is_send() {
        fn assert_send<T: Send>() {}

        assert_send::<hydra_hog::Hog>();
        assert_send::<OsWorkerProcess>();
        assert_send::<MemoryPressure>();
        assert_send::<hydra_hog::RunReport>();
    }

    // Reports round-trip through the JSON export
    #[test]
    fn test_report_is_serializable() {
        fn assert_serde<T: serde::Serialize + serde::de::DeserializeOwned>() {}

        assert_serde::<hydra_hog::RunReport>();
        assert_serde::<hydra_hog::RunConfig>();
    }
}
