use tracing_subscriber::EnvFilter;
use ubars::{Template, Value};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("ubars=trace"))
        .with_test_writer()
        .try_init();
}

#[test]
fn test_log_helper_writes_nothing_to_output() {
    init_tracing();
    let template = Template::compile(
        "a{{log \"value is\" n}}b{{log \"careful\" level=\"warn\"}}c{{log n level=3}}",
    )
    .unwrap();
    let data = Value::Map([("n".to_string(), Value::from(5))].into());
    assert_eq!(template.render_value(&data).unwrap(), "abc");
}
