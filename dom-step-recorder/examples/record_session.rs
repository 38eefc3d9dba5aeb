use dom_step_recorder::{
    ChannelSink, Document, Modifiers, PageContext, RawEvent, RecorderConfig, RecorderContext,
};
use tokio_stream::StreamExt;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut doc = Document::new();
    let body = doc.body();
    let form = doc.append_element(body, "form")?;
    let email = doc.append_element_with(form, "input", &[("type", "email"), ("name", "email")])?;
    let password = doc.append_element_with(form, "input", &[("type", "password"), ("name", "pw")])?;
    let submit = doc.append_element_with(form, "button", &[("type", "submit")])?;
    doc.append_text(submit, "Sign in")?;

    let config = RecorderConfig {
        input_debounce_ms: Some(300),
        close_grace_unit_ms: 100,
        ..RecorderConfig::default()
    };
    let sink = ChannelSink::new(64);
    let mut messages = sink.event_stream();
    let mut recorder = RecorderContext::new("Sign in", config, sink);
    recorder.set_page(PageContext::top_level("https://app.example.com/login"));

    recorder.start()?;
    let mut now = 0;
    for (field, text) in [(email, "ada@example.com"), (password, "correct horse")] {
        doc.set_value(field, text)?;
        recorder.handle_event(&doc, &RawEvent::Input { target: field }, now);
        now += 1000;
        recorder.poll(now);
    }
    recorder.handle_event(
        &doc,
        &RawEvent::KeyDown {
            target: Some(password),
            key: "Enter".to_string(),
            modifiers: Modifiers::default(),
        },
        now,
    );
    recorder.handle_event(&doc, &RawEvent::Click { target: submit }, now + 50);
    recorder.handle_event(
        &doc,
        &RawEvent::Load {
            url: "https://app.example.com/home".to_string(),
        },
        now + 400,
    );

    let workflow = recorder.finish()?;
    println!("{}", workflow.to_json()?);

    recorder.close();
    recorder.run_close_grace().await;
    drop(recorder);

    while let Some(message) = messages.next().await {
        info!("{} -> {}", message.event_name(), serde_json::to_string(&message)?);
    }
    Ok(())
}
