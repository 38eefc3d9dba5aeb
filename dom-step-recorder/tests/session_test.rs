use std::time::Duration;

use dom_step_recorder::{
    ChannelSink, ControlAction, Document, HostCommand, HostMessage, InputAnswer, InputMode,
    InputRequest, MemorySink, PageContext, RawEvent, RecorderConfig, RecorderContext,
};
use futures::StreamExt;

#[tokio::test(start_paused = true)]
async fn test_close_grace_counts_down_then_tears_down() {
    let mut recorder = RecorderContext::new("t", RecorderConfig::default(), MemorySink::new());
    recorder.start().unwrap();
    assert_eq!(recorder.close(), 3);
    assert_eq!(recorder.overlay().countdown(), Some(3));
    assert!(!recorder.overlay().is_torn_down());

    let started = tokio::time::Instant::now();
    recorder.run_close_grace().await;
    assert_eq!(started.elapsed(), Duration::from_millis(3000));
    assert!(recorder.overlay().is_torn_down());
    assert_eq!(recorder.overlay().countdown(), Some(0));
    assert_eq!(recorder.tick_close(), None);
}

#[tokio::test]
async fn test_human_input_does_not_block_capture() {
    let mut doc = Document::new();
    let body = doc.body();
    let button = doc
        .append_element_with(body, "button", &[("id", "next")])
        .unwrap();

    let mut recorder = RecorderContext::new("t", RecorderConfig::default(), MemorySink::new());
    recorder.set_page(PageContext::top_level("https://a.test/"));
    recorder.start().unwrap();

    let response = recorder
        .apply_command(HostCommand::RequestInput(InputRequest::with_choices(
            InputMode::Radio,
            "Which account?",
            vec!["personal".to_string(), "work".to_string()],
        )))
        .unwrap()
        .unwrap();

    let steps = recorder.handle_event(&doc, &RawEvent::Click { target: button }, 1);
    assert_eq!(steps.len(), 1);
    assert!(recorder.overlay().pending_input().is_some());

    assert!(recorder
        .submit_input(InputAnswer::Text("other".to_string()))
        .is_err());
    recorder
        .submit_input(InputAnswer::Text("work".to_string()))
        .unwrap();

    assert_eq!(
        response.wait().await,
        Some(InputAnswer::Text("work".to_string()))
    );
    assert_eq!(
        recorder.sink().messages().last(),
        Some(&HostMessage::SubmitOverlayInput(InputAnswer::Text(
            "work".to_string()
        )))
    );
}

#[tokio::test]
async fn test_close_cancels_pending_input() {
    let mut recorder = RecorderContext::new("t", RecorderConfig::default(), MemorySink::new());
    let response = recorder
        .apply_command(HostCommand::RequestInput(InputRequest::text("Name?")))
        .unwrap()
        .unwrap();
    recorder.close();
    assert_eq!(response.wait().await, None);
    assert!(recorder
        .apply_command(HostCommand::Output {
            text: "late".to_string()
        })
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_channel_sink_streams_session() {
    let mut doc = Document::new();
    let body = doc.body();
    let link = doc.append_element_with(body, "a", &[("href", "/x")]).unwrap();

    let sink = ChannelSink::new(32);
    let stream = sink.event_stream();
    let mut recorder = RecorderContext::new("t", RecorderConfig::default(), sink);
    recorder.start().unwrap();
    recorder.handle_event(&doc, &RawEvent::Click { target: link }, 1);
    recorder.request_update();
    recorder.finish().unwrap();
    drop(recorder);

    let events: Vec<HostMessage> = stream.collect().await;
    assert_eq!(
        events.iter().map(HostMessage::event_name).collect::<Vec<_>>(),
        vec!["control", "elementClick", "control", "control"]
    );
    assert_eq!(events[2], HostMessage::control(ControlAction::Update));
    assert_eq!(events[3], HostMessage::control(ControlAction::Finish));
}

#[tokio::test]
async fn test_debounced_input_released_by_poll() {
    let mut doc = Document::new();
    let body = doc.body();
    let field = doc.append_element(body, "textarea").unwrap();

    let mut recorder =
        RecorderContext::new("t", RecorderConfig::debounced(300), MemorySink::new());
    recorder.start().unwrap();
    for (at, text) in [(0, "h"), (100, "hi"), (200, "hi!")] {
        doc.set_value(field, text).unwrap();
        assert!(recorder
            .handle_event(&doc, &RawEvent::Input { target: field }, at)
            .is_empty());
    }
    assert!(recorder.poll(250).is_none());
    let step = recorder.poll(500).unwrap();
    assert_eq!(step.sequence_index(), 0);
    assert_eq!(recorder.steps().len(), 1);
    assert_eq!(recorder.sink().event_names(), vec!["control", "elementInput"]);
}
