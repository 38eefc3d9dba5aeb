use dom_step_recorder::{
    DocumentSpec, MemorySink, PageContext, PersistedStep, PersistedWorkflow, Platform, RawEvent,
    RecorderConfig, RecorderContext, StepKind,
};
use tempfile::tempdir;

const CHECKOUT: &str = r#"{
  "body": [
    {"tag": "form", "attributes": [["id", "checkout"]], "children": [
      {"tag": "select", "key": "country", "attributes": [["name", "country"]],
       "options": [{"value": "us", "label": "United States"}, {"value": "de", "label": "Germany"}]},
      {"tag": "input", "key": "email", "attributes": [["type", "email"], ["name", "email"]]},
      {"tag": "button", "key": "pay", "text": "Pay now", "attributes": [["type", "submit"]]}
    ]}
  ]
}"#;

#[test]
fn test_finished_session_saves_and_loads() {
    let spec: DocumentSpec = serde_json::from_str(CHECKOUT).unwrap();
    let (mut doc, keys) = spec.build().unwrap();

    let config = RecorderConfig {
        platform: Platform::Other,
        tab_id: 2,
        record_initial_navigation: true,
        ..RecorderConfig::default()
    };
    let mut recorder = RecorderContext::new("checkout", config, MemorySink::new());
    recorder.set_page(PageContext::top_level("https://shop.test/checkout"));
    recorder.start().unwrap();
    let session_id = recorder.session_id().to_string();

    doc.select_value(keys["country"], "de").unwrap();
    recorder.handle_event(&doc, &RawEvent::Change { target: keys["country"] }, 10);
    doc.set_value(keys["email"], "a@b.test").unwrap();
    recorder.handle_event(&doc, &RawEvent::Input { target: keys["email"] }, 20);
    recorder.handle_event(&doc, &RawEvent::Click { target: keys["pay"] }, 30);

    let workflow = recorder.finish().unwrap();
    assert_eq!(workflow.name, "checkout");
    assert_eq!(workflow.session_id, session_id);
    assert_eq!(workflow.steps.len(), 4);

    let dir = tempdir().unwrap();
    let path = dir.path().join("checkout.json");
    workflow.save_to_file(&path).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["sessionId"], session_id);
    let types: Vec<_> = raw["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(types, vec!["navigation", "select", "input", "click"]);
    assert_eq!(raw["steps"][1]["selectedText"], "Germany");
    assert_eq!(raw["steps"][1]["tabId"], 2);
    assert_eq!(raw["steps"][3]["xpath"], "id(\"checkout\")/button[1]");

    let loaded = PersistedWorkflow::load_from_file(&path).unwrap();
    assert_eq!(loaded, workflow);
    let steps = loaded.to_steps().unwrap();
    let kinds: Vec<_> = steps.iter().map(|s| s.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            StepKind::Navigation,
            StepKind::SelectChange,
            StepKind::Input,
            StepKind::Click
        ]
    );
    assert_eq!(steps[3].label(), "Click on BUTTON");
}

#[test]
fn test_artifact_records_minimum_fields() {
    let spec: DocumentSpec = serde_json::from_str(CHECKOUT).unwrap();
    let (doc, keys) = spec.build().unwrap();
    let mut recorder = RecorderContext::new("t", RecorderConfig::default(), MemorySink::new());
    recorder.set_page(PageContext::top_level("https://shop.test/"));
    recorder.start().unwrap();
    recorder.handle_event(&doc, &RawEvent::Click { target: keys["pay"] }, 42);

    for step in recorder.to_persisted().steps {
        let json = serde_json::to_value(&step).unwrap();
        for field in ["type", "timestamp", "tabId", "url"] {
            assert!(json.get(field).is_some(), "missing {field} in {json}");
        }
        assert!(matches!(step, PersistedStep::Click { .. }));
        assert_eq!(json["timestamp"], 42);
        assert_eq!(json["elementText"], "Pay now");
    }
}
