fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use presence_protocol::{
        Activity, Command, Envelope, FrameDecoder, Handshake, SetActivityArgs, encode_frame,
    };

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Normalizes numbers so that `1700000000` and `1700000000.0` compare
    /// equal. Peers send integral timestamps, the client serializes `f64`.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => serde_json::json!(f),
                None => v.clone(),
            },
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect(),
            ),
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Deserializes a fixture, re-serializes it, and compares the JSON values
    /// (order-independent, number-normalized).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            normalize_value(&fixture),
            normalize_value(&reserialized),
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  ours:    {reserialized}"
        );
        parsed
    }

    #[test]
    fn fixture_handshake() {
        let handshake: Handshake = roundtrip_test("handshake.json");
        assert_eq!(handshake, Handshake::new("123456789012345678"));
    }

    #[test]
    fn fixture_activity_full() {
        let activity: Activity = roundtrip_test("activity_full.json");
        assert_eq!(activity.buttons.len(), 2);
        assert!(activity.validate().is_ok());
        let keys: Vec<&str> = activity.image_keys().collect();
        assert_eq!(keys, vec!["progress", "badge"]);
    }

    #[test]
    fn fixture_set_activity() {
        let cmd: Command<SetActivityArgs> = roundtrip_test("set_activity.json");
        assert_eq!(cmd.cmd, "SET_ACTIVITY");
        assert_eq!(cmd.args.pid, 4242);
        let activity = cmd.args.activity.unwrap();
        assert_eq!(activity.start_timestamp, Some(1_700_000_000.0));
        assert_eq!(activity.large_image_key.as_deref(), Some("logo"));
    }

    #[test]
    fn fixture_clear_activity() {
        let cmd: Command<SetActivityArgs> = roundtrip_test("clear_activity.json");
        assert!(cmd.args.activity.is_none());
    }

    #[test]
    fn fixture_envelope() {
        let envelope: Envelope = roundtrip_test("envelope.json");
        let frame = envelope.into_frame();
        assert_eq!(frame.opcode, 1);
        assert_eq!(frame.payload["data"]["details"], "Playing Solo");
    }

    #[test]
    fn fresh_commands_match_fixture_shape() {
        let fixture = load_fixture("clear_activity.json");
        let ours = serde_json::to_value(Command::set_activity(4242, None)).unwrap();

        assert_eq!(ours["cmd"], fixture["cmd"]);
        assert_eq!(ours["args"], fixture["args"]);
        assert_eq!(ours["nonce"].as_str().unwrap().len(), 36);
    }

    #[test]
    fn handshake_frame_golden_bytes() {
        let bytes = encode_frame(0, &Handshake::new("42")).unwrap();

        let body = br#"{"v":1,"client_id":"42"}"#;
        let mut expected = vec![0, 0, 0, 0, 24, 0, 0, 0];
        expected.extend_from_slice(body);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn golden_frame_decodes_across_splits() {
        let mut bytes = vec![1, 0, 0, 0, 12, 0, 0, 0];
        bytes.extend_from_slice(br#"{"evt":"OK"}"#);

        for split in 0..bytes.len() {
            let mut decoder = FrameDecoder::new();
            let mut frames = decoder.decode(&bytes[..split]);
            frames.extend(decoder.decode(&bytes[split..]));

            assert_eq!(frames.len(), 1, "split at {split}");
            let frame = frames.pop().unwrap().unwrap();
            assert_eq!(frame.opcode, 1);
            assert_eq!(frame.payload["evt"], "OK");
        }
    }
}
