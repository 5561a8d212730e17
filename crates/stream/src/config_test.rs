//! Configuration parsing tests

use sluice_manager::Environment;

use super::*;

fn parse(raw: &str) -> Result<StreamConfig> {
    StreamConfig::from_str_interpolated(raw, &Environment::new())
}

#[test]
fn test_minimal_config() {
    let conf = parse(
        r#"
        [input.generate]
        payload = "hello"

        [output.drop]
        "#,
    )
    .unwrap();

    match &conf.input {
        InputConfig::Generate(gc) => {
            assert_eq!(gc.payload, "hello");
            assert_eq!(gc.interval_ms, 1000);
            assert_eq!(gc.batch_size, 1);
        }
        other => panic!("unexpected input: {other:?}"),
    }
    assert!(matches!(conf.output, OutputConfig::Drop(_)));
    assert!(conf.buffer.is_none());
    assert_eq!(conf.pipeline.threads, 1);
    assert!(conf.pipeline.processors.is_empty());
}

#[test]
fn test_broker_config_with_children() {
    let conf = parse(
        r#"
        [input.generate]
        payload = "x"

        [output.broker]
        pattern = "fan_out"
        outputs = [{ stdout = {} }, { drop = {} }]
        "#,
    )
    .unwrap();

    match &conf.output {
        OutputConfig::Broker(broker) => {
            assert_eq!(broker.pattern, BrokerPattern::FanOut);
            assert_eq!(broker.outputs.len(), 2);
            assert!(matches!(broker.outputs[0], OutputConfig::Stdout(_)));
            assert!(matches!(broker.outputs[1], OutputConfig::Drop(_)));
        }
        other => panic!("unexpected output: {other:?}"),
    }
}

#[test]
fn test_nested_brokers() {
    let conf = parse(
        r#"
        [input.broker]
        inputs = [
            { generate = { payload = "a" } },
            { generate = { payload = "b" } },
        ]

        [output.broker]
        pattern = "fallback"
        outputs = [
            { broker = { pattern = "round_robin", outputs = [{ drop = {} }] } },
            { drop = {} },
        ]
        "#,
    )
    .unwrap();

    match &conf.input {
        InputConfig::Broker(broker) => assert_eq!(broker.inputs.len(), 2),
        other => panic!("unexpected input: {other:?}"),
    }
}

#[test]
fn test_pipeline_and_processors() {
    let conf = parse(
        r#"
        [input.inproc]
        0 = "unused"

        [input]
        inproc = "feed"

        [output.drop]
        "#,
    );
    // A malformed document must not panic, only error.
    assert!(conf.is_err());

    let conf = parse(
        r#"
        [input]
        inproc = "feed"

        [pipeline]
        threads = 4
        processors = [
            { split = { size = 5 } },
            { try = [{ noop = {} }] },
            { switch = [
                { errored = true, processors = [{ noop = {} }] },
                { errored = false, processors = [] },
            ] },
        ]

        [output.drop]
        "#,
    )
    .unwrap();

    assert_eq!(conf.pipeline.threads, 4);
    assert_eq!(conf.pipeline.processors.len(), 3);
    assert!(matches!(
        conf.pipeline.processors[0],
        ProcessorConfig::Split(SplitConfig { size: 5 })
    ));
}

#[test]
fn test_resources_and_buffer() {
    let conf = parse(
        r#"
        [input]
        resource = "feed"

        [buffer.memory]
        limit_bytes = 1024

        [output]
        resource = "sink"

        [[input_resources]]
        label = "feed"
        [input_resources.generate]
        payload = "x"

        [[output_resources]]
        label = "sink"
        [output_resources.drop]

        [[processor_resources]]
        label = "passthrough"
        [processor_resources.noop]

        [[cache_resources]]
        label = "store"
        [cache_resources.memory]
        default_ttl_ms = 5000

        [[rate_limit_resources]]
        label = "tokens"
        [rate_limit_resources.local]
        count = 10
        interval_ms = 1000
        "#,
    )
    .unwrap();

    assert!(matches!(
        conf.buffer,
        Some(BufferConfig::Memory(MemoryBufferConfig { limit_bytes: 1024 }))
    ));
    assert_eq!(conf.input_resources[0].label, "feed");
    assert_eq!(conf.cache_resources.len(), 1);
    assert_eq!(conf.rate_limit_resources.len(), 1);
}

#[test]
fn test_env_interpolation() {
    let env = Environment::new().with_var("PAYLOAD", "interpolated");
    let conf = StreamConfig::from_str_interpolated(
        r#"
        [input.generate]
        payload = "${PAYLOAD}"
        interval_ms = ${INTERVAL_MS:250}

        [output.drop]
        "#,
        &env,
    )
    .unwrap();

    match &conf.input {
        InputConfig::Generate(gc) => {
            assert_eq!(gc.payload, "interpolated");
            assert_eq!(gc.interval_ms, 250);
        }
        other => panic!("unexpected input: {other:?}"),
    }
}

#[test]
fn test_missing_env_var_fails_load() {
    let err = parse(
        r#"
        [input.generate]
        payload = "${SLUICE_TEST_THIS_VAR_IS_NOT_SET}"

        [output.drop]
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Interpolation(_)));
}

#[test]
fn test_empty_broker_rejected() {
    let err = parse(
        r#"
        [input.generate]
        payload = "x"

        [output.broker]
        pattern = "greedy"
        outputs = []
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}

#[test]
fn test_zero_threads_rejected() {
    let err = parse(
        r#"
        [input.generate]
        payload = "x"

        [pipeline]
        threads = 0

        [output.drop]
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}

#[test]
fn test_duplicate_labels_rejected() {
    let err = parse(
        r#"
        [input.generate]
        payload = "x"

        [output.drop]

        [[cache_resources]]
        label = "store"
        [cache_resources.memory]

        [[cache_resources]]
        label = "store"
        [cache_resources.memory]
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}

#[test]
fn test_unknown_component_rejected() {
    assert!(parse(
        r#"
        [input.kafka]
        addresses = ["localhost:9092"]

        [output.drop]
        "#,
    )
    .is_err());
}
