mod tests {
    use config::Config;
    use config::File;
    use config::FileFormat;

    use crate::Error;
    use crate::ManagerConfig;

    #[test]
    fn defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.change_queue_size, 1024);
        assert!(!config.log_deltas);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: ManagerConfig = Config::builder()
            .add_source(File::from_str("log_deltas = true", FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert!(config.log_deltas);
        assert_eq!(config.change_queue_size, 1024);
    }

    #[test]
    fn file_overrides_defaults() {
        let config: ManagerConfig = Config::builder()
            .add_source(File::from_str("change_queue_size = 16", FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.change_queue_size, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_change_queue_is_rejected() {
        let config = ManagerConfig {
            change_queue_size: 0,
            ..ManagerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("change_queue_size"));
    }

    #[test]
    fn load_without_overrides_yields_defaults() {
        // CONFIG_PATH is not set in the test environment, so load()
        // produces the defaults layered with (empty) env overrides.
        if std::env::var("CONFIG_PATH").is_err() {
            let config = ManagerConfig::load().unwrap().validate().unwrap();
            assert_eq!(config, ManagerConfig::default());
        }
    }
}
