#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::{Value, json};
    use valyria_config::schema::{AgentConfig, ToolsConfig};
    use valyria_core::{MessageContent, Mode, Role, ToolCall, ToolExecutor, ValyriaError};
    use valyria_llm::{LlmProvider, MockProvider, MockResponse, StopReason};
    use valyria_runtime::*;
    use valyria_store::{ConversationTurn, PlaybookRule, Playbooks};

    fn workspace(dir: &Path) -> WorkspaceTools {
        WorkspaceTools::new(ToolsConfig {
            root: dir.to_path_buf(),
            ..Default::default()
        })
        .unwrap()
    }

    async fn run(tools: &WorkspaceTools, name: &str, args: Value) -> Value {
        let call = ToolCall {
            id: "toolu_test".into(),
            tool_name: name.into(),
            arguments: args,
        };
        let result = tools.execute(&call).await.unwrap();
        let data = result.data.unwrap();
        assert_eq!(result.is_error, data["success"] != json!(true));
        data
    }

    fn cat_playbooks() -> Playbooks {
        Playbooks {
            rules: vec![PlaybookRule {
                id: 1,
                topic: "coding".into(),
                rule: "Explain with cat examples".into(),
                priority: 50,
                enabled: true,
                created_at: Utc::now(),
            }],
        }
    }

    fn turn(user: &str, assistant: &str) -> ConversationTurn {
        ConversationTurn {
            user: user.into(),
            assistant: assistant.into(),
            timestamp: Utc::now(),
            mode: "CHAT".into(),
        }
    }

    // ── Workspace tools ────────────────────────────────────────

    #[tokio::test]
    async fn test_write_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let tools = workspace(tmp.path());

        let written = run(
            &tools,
            "write_file",
            json!({"path": "data/notes.txt", "content": "hello"}),
        )
        .await;
        assert_eq!(written["success"], true);
        assert_eq!(written["mode"], "w");
        assert_eq!(written["size"], 5);

        let appended = run(
            &tools,
            "write_file",
            json!({"path": "data/notes.txt", "content": " world", "mode": "a"}),
        )
        .await;
        assert_eq!(appended["success"], true);

        let read = run(&tools, "read_file", json!({"path": "data/notes.txt"})).await;
        assert_eq!(read["success"], true);
        assert_eq!(read["content"], "hello world");
        assert_eq!(read["error"], Value::Null);
    }

    #[tokio::test]
    async fn test_write_outside_write_dirs_denied() {
        let tmp = tempfile::tempdir().unwrap();
        let tools = workspace(tmp.path());

        let root_write = run(&tools, "write_file", json!({"path": "notes.txt", "content": "x"})).await;
        assert_eq!(root_write["success"], false);
        assert!(root_write["error"].as_str().unwrap().starts_with("Write access denied"));
        assert!(!tmp.path().join("notes.txt").exists());

        let script = run(&tools, "write_file", json!({"path": "data/run.sh", "content": "x"})).await;
        assert_eq!(script["success"], false);

        let escape = run(
            &tools,
            "write_file",
            json!({"path": "data/../../escape.txt", "content": "x"}),
        )
        .await;
        assert_eq!(escape["success"], false);

        let bad_mode = run(
            &tools,
            "write_file",
            json!({"path": "data/a.txt", "content": "x", "mode": "x"}),
        )
        .await;
        assert_eq!(bad_mode["success"], false);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_write_dir_cannot_escape_root() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("data")).unwrap();
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("data/link")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("dangling.txt"),
            tmp.path().join("data/dangling.txt"),
        )
        .unwrap();
        let tools = workspace(tmp.path());

        let escaped = run(
            &tools,
            "write_file",
            json!({"path": "data/link/escaped.txt", "content": "hello"}),
        )
        .await;
        assert_eq!(escaped["success"], false);
        assert!(!outside.path().join("escaped.txt").exists());

        let nested = run(
            &tools,
            "write_file",
            json!({"path": "data/link/new/deeper.txt", "content": "hello"}),
        )
        .await;
        assert_eq!(nested["success"], false);
        assert!(!outside.path().join("new").exists());

        let dangling = run(
            &tools,
            "write_file",
            json!({"path": "data/dangling.txt", "content": "hello"}),
        )
        .await;
        assert_eq!(dangling["success"], false);
        assert!(!outside.path().join("dangling.txt").exists());

        std::fs::write(outside.path().join("secret.txt"), "s3cret").unwrap();
        let read = run(&tools, "read_file", json!({"path": "data/link/secret.txt"})).await;
        assert_eq!(read["success"], false);

        // Ordinary nested writes inside a write dir still work.
        let ok = run(
            &tools,
            "write_file",
            json!({"path": "data/sub/dir/ok.txt", "content": "fine"}),
        )
        .await;
        assert_eq!(ok["success"], true);
        assert!(tmp.path().join("data/sub/dir/ok.txt").exists());
    }

    #[tokio::test]
    async fn test_read_errors() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("data")).unwrap();
        let tools = workspace(tmp.path());

        let missing = run(&tools, "read_file", json!({"path": "nope.txt"})).await;
        assert_eq!(missing["error"], "File not found: nope.txt");

        let dir = run(&tools, "read_file", json!({"path": "data"})).await;
        assert_eq!(dir["error"], "Not a file: data");

        let outside = run(&tools, "read_file", json!({"path": "../secret"})).await;
        assert_eq!(outside["error"], "Access denied: ../secret");
    }

    #[tokio::test]
    async fn test_missing_argument_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let tools = workspace(tmp.path());
        let call = ToolCall {
            id: "t".into(),
            tool_name: "read_file".into(),
            arguments: json!({}),
        };
        let err = tools.execute(&call).await.unwrap_err();
        assert!(matches!(err, ValyriaError::ToolExecution { .. }));

        let unknown = ToolCall {
            id: "t".into(),
            tool_name: "delete_file".into(),
            arguments: json!({"path": "x"}),
        };
        assert!(matches!(
            tools.execute(&unknown).await.unwrap_err(),
            ValyriaError::ToolNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_list_files_with_pattern() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("data/nested")).unwrap();
        std::fs::write(tmp.path().join("main.py"), "print(1)").unwrap();
        std::fs::write(tmp.path().join("README.md"), "# hi").unwrap();
        std::fs::write(tmp.path().join("data/a.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("data/nested/b.json"), "{}").unwrap();
        let tools = workspace(tmp.path());

        let py = run(&tools, "list_files", json!({"pattern": "*.py"})).await;
        assert_eq!(py["count"], 1);
        assert_eq!(py["files"][0]["name"], "main.py");
        assert_eq!(py["files"][0]["extension"], ".py");

        let top = run(&tools, "list_files", json!({})).await;
        assert_eq!(top["count"], 2);

        let nested = run(&tools, "list_files", json!({"pattern": "data/*.json"})).await;
        assert_eq!(nested["count"], 1);
        assert_eq!(nested["files"][0]["path"], "data/a.json");

        let deep = run(
            &tools,
            "list_files",
            json!({"directory": "data", "pattern": "**/*.json"}),
        )
        .await;
        assert_eq!(deep["count"], 2);

        let missing = run(&tools, "list_files", json!({"directory": "ghost"})).await;
        assert_eq!(missing["success"], false);
    }

    #[tokio::test]
    async fn test_run_command_rules() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("hello.txt"), "hi there").unwrap();
        let tools = workspace(tmp.path());

        let ok = run(&tools, "run_command", json!({"command": "cat hello.txt"})).await;
        assert_eq!(ok["success"], true);
        assert_eq!(ok["output"], "hi there");
        assert_eq!(ok["return_code"], 0);

        let forbidden = run(&tools, "run_command", json!({"command": "ls > out.txt"})).await;
        assert_eq!(forbidden["success"], false);
        assert!(forbidden["error"].as_str().unwrap().starts_with("Forbidden command"));

        let unlisted = run(&tools, "run_command", json!({"command": "echo hi"})).await;
        assert!(
            unlisted["error"]
                .as_str()
                .unwrap()
                .starts_with("Command not in whitelist")
        );

        let failing = run(&tools, "run_command", json!({"command": "cat missing.txt"})).await;
        assert_eq!(failing["success"], false);
        assert_ne!(failing["return_code"], 0);
        assert!(failing["error"].is_string());
    }

    #[tokio::test]
    async fn test_run_command_timeout() {
        let tmp = tempfile::tempdir().unwrap();
        let tools = WorkspaceTools::new(ToolsConfig {
            root: tmp.path().to_path_buf(),
            command_prefixes: vec!["sleep".into()],
            ..Default::default()
        })
        .unwrap();
        let out = run(&tools, "run_command", json!({"command": "sleep 5", "timeout": 1})).await;
        assert_eq!(out["success"], false);
        assert_eq!(out["error"], "Command timed out after 1s");
        assert_eq!(out["return_code"], -1);
    }

    // ── Offline brain ──────────────────────────────────────────

    #[test]
    fn test_offline_emergency_protocols() {
        let none = Playbooks::default();
        let fire = offline_reply("There is SMOKE in the kitchen", Mode::Chat, &none);
        assert!(fire.starts_with("EMERGENCY PROTOCOL:\n1. GET OUT of the building NOW"));
        let bleeding = offline_reply("my hand is bleeding", Mode::Chat, &none);
        assert!(bleeding.starts_with("EMERGENCY - BLEEDING PROTOCOL:"));
        let generic = offline_reply("what's the weather", Mode::Emergency, &none);
        assert!(generic.starts_with("EMERGENCY PROTOCOL:\n1. If life-threatening"));
    }

    #[test]
    fn test_offline_loop_answers() {
        let plain = offline_reply("explain a python loop", Mode::Chat, &Playbooks::default());
        assert!(plain.starts_with("A for loop repeats code for each item in a sequence."));
        let cats = offline_reply("explain a python loop", Mode::Chat, &cat_playbooks());
        assert!(cats.contains("Whiskers"));
    }

    #[test]
    fn test_offline_greeting_identity_default() {
        let none = Playbooks::default();
        assert!(offline_reply("Hey!", Mode::Chat, &none).starts_with("Hello! I'm Valyria"));
        assert!(offline_reply("Who are you?", Mode::Read, &none).starts_with("I'm Valyria, your AI guardian"));
        // "this" must not read as a greeting
        let default = offline_reply("is this thing on", Mode::Chat, &none);
        assert!(default.starts_with("I'm operating in offline mode with limited intelligence."));
    }

    // ── Brain ──────────────────────────────────────────────────

    #[tokio::test]
    async fn test_brain_without_provider_is_offline() {
        let brain = Brain::new(AgentConfig::default(), None, None);
        assert!(!brain.is_online());
        let thought = brain
            .think(ThinkInput {
                message: "hello",
                mode: Mode::Chat,
                playbooks: &Playbooks::default(),
                history: &[],
            })
            .await;
        assert_eq!(thought.source, BrainSource::Offline);
        assert!(thought.text.starts_with("Hello! I'm Valyria"));
    }

    #[tokio::test]
    async fn test_brain_online_answer_uses_history() {
        let mock = MockProvider::new("mock").with_response("Sure thing.");
        let requests = mock.recorded_requests();
        let provider: Arc<dyn LlmProvider> = Arc::new(mock);
        let brain = Brain::new(AgentConfig::default(), Some(provider), None);

        let history: Vec<_> = (0..12).map(|i| turn(&format!("q{i}"), &format!("a{i}"))).collect();
        let thought = brain
            .think(ThinkInput {
                message: "next",
                mode: Mode::Chat,
                playbooks: &Playbooks::default(),
                history: &history,
            })
            .await;
        assert_eq!(thought.source, BrainSource::Online);
        assert_eq!(thought.text, "Sure thing.");

        let requests = requests.lock();
        let request = &requests[0];
        // ten replayed turns plus the new message
        assert_eq!(request.messages.len(), 21);
        assert_eq!(request.messages[0].text_content(), "q2");
        assert_eq!(request.messages[20].text_content(), "next");
        assert_eq!(request.max_tokens, 512);
        assert!(request.tools.is_empty());
        assert!(request.system.as_deref().unwrap().starts_with("You are Valyria."));
    }

    #[tokio::test]
    async fn test_brain_emergency_limits() {
        let mock = MockProvider::new("mock").with_response("Call 911.");
        let requests = mock.recorded_requests();
        let brain = Brain::new(AgentConfig::default(), Some(Arc::new(mock)), None);

        let history: Vec<_> = (0..6).map(|i| turn(&format!("q{i}"), "a")).collect();
        brain
            .think(ThinkInput {
                message: "I fell",
                mode: Mode::Emergency,
                playbooks: &Playbooks::default(),
                history: &history,
            })
            .await;

        let requests = requests.lock();
        assert_eq!(requests[0].messages.len(), 7);
        assert_eq!(requests[0].max_tokens, 256);
        assert!(requests[0].system.as_deref().unwrap().contains("EMERGENCY MODE:"));
    }

    #[tokio::test]
    async fn test_brain_runs_tool_loop() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("hello.txt"), "hi from disk").unwrap();
        let tools: Arc<dyn ToolExecutor> = Arc::new(workspace(tmp.path()));

        let mock = MockProvider::new("mock")
            .with_tool_call("read_file", json!({"path": "hello.txt"}))
            .with_response("The file says hi.");
        let requests = mock.recorded_requests();
        let brain = Brain::new(AgentConfig::default(), Some(Arc::new(mock)), Some(tools));

        let thought = brain
            .think(ThinkInput {
                message: "what's in hello.txt?",
                mode: Mode::Chat,
                playbooks: &Playbooks::default(),
                history: &[],
            })
            .await;
        assert_eq!(thought.text, "The file says hi.");
        assert_eq!(thought.tool_calls, 1);
        assert_eq!(thought.usage.input_tokens, 200);

        let requests = requests.lock();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools.len(), 4);
        let second = &requests[1];
        assert_eq!(second.messages.len(), 3);
        assert_eq!(second.messages[1].role, Role::Assistant);
        assert_eq!(second.messages[2].role, Role::Tool);
        match &second.messages[2].content[0] {
            MessageContent::ToolResult { content, is_error, .. } => {
                assert!(!is_error);
                let value: Value = serde_json::from_str(content).unwrap();
                assert_eq!(value["content"], "hi from disk");
            }
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_brain_tool_rounds_are_bounded() {
        let tmp = tempfile::tempdir().unwrap();
        let tools: Arc<dyn ToolExecutor> = Arc::new(workspace(tmp.path()));
        let mut mock = MockProvider::new("mock");
        for _ in 0..5 {
            mock = mock.with_tool_call("list_files", json!({}));
        }
        let brain = Brain::new(
            AgentConfig {
                max_tool_rounds: 2,
                ..Default::default()
            },
            Some(Arc::new(mock)),
            Some(tools),
        );
        let thought = brain
            .think(ThinkInput {
                message: "list forever",
                mode: Mode::Chat,
                playbooks: &Playbooks::default(),
                history: &[],
            })
            .await;
        assert_eq!(thought.tool_calls, 2);
        assert_eq!(thought.text, "I stopped after 2 tool steps without finishing.");
    }

    #[tokio::test]
    async fn test_brain_unknown_tool_reported_to_model() {
        let tmp = tempfile::tempdir().unwrap();
        let tools: Arc<dyn ToolExecutor> = Arc::new(workspace(tmp.path()));
        let mock = MockProvider::new("mock")
            .with_tool_call("delete_file", json!({"path": "x"}))
            .with_response("Sorry, I can't delete files.");
        let requests = mock.recorded_requests();
        let brain = Brain::new(AgentConfig::default(), Some(Arc::new(mock)), Some(tools));
        let thought = brain
            .think(ThinkInput {
                message: "delete x",
                mode: Mode::Chat,
                playbooks: &Playbooks::default(),
                history: &[],
            })
            .await;
        assert_eq!(thought.source, BrainSource::Online);
        let requests = requests.lock();
        match &requests[1].messages[2].content[0] {
            MessageContent::ToolResult { is_error, content, .. } => {
                assert!(is_error);
                assert!(content.contains("tool not found: delete_file"));
            }
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_brain_falls_back_with_prefix() {
        let brain = Brain::new(
            AgentConfig::default(),
            Some(Arc::new(MockProvider::new("mock").with_error("HTTP 500: boom"))),
            None,
        );
        let thought = brain
            .think(ThinkInput {
                message: "hello",
                mode: Mode::Chat,
                playbooks: &Playbooks::default(),
                history: &[],
            })
            .await;
        assert_eq!(thought.source, BrainSource::Fallback);
        assert!(thought.text.starts_with("[Offline mode] Hello! I'm Valyria"));

        let brain = Brain::new(
            AgentConfig::default(),
            Some(Arc::new(MockProvider::new("mock").with_error("down"))),
            None,
        );
        let thought = brain
            .think(ThinkInput {
                message: "the house is on fire",
                mode: Mode::Emergency,
                playbooks: &Playbooks::default(),
                history: &[],
            })
            .await;
        assert!(thought.text.starts_with("[OFFLINE - EMERGENCY] EMERGENCY PROTOCOL:"));
    }

    #[tokio::test]
    async fn test_end_turn_with_stray_tool_calls_stops() {
        let mock = MockProvider::new("mock").with_mock_response(MockResponse {
            text: "done".into(),
            stop_reason: StopReason::EndTurn,
            ..Default::default()
        });
        let brain = Brain::new(AgentConfig::default(), Some(Arc::new(mock)), None);
        let thought = brain
            .think(ThinkInput {
                message: "hi",
                mode: Mode::Public,
                playbooks: &Playbooks::default(),
                history: &[],
            })
            .await;
        assert_eq!(thought.text, "done");
        assert_eq!(thought.tool_calls, 0);
    }
}
