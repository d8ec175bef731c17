//! Test doubles shared by the stage tests.

use crate::executor::{CommandOutput, CommandRunner, ShellCommand};
use crate::prompt::Prompter;
use async_trait::async_trait;
use macdeploy_common::Result;
use std::collections::VecDeque;
use std::sync::Mutex;

struct Rule {
    needle: String,
    output: CommandOutput,
    remaining: Option<usize>,
}

/// Answers commands by substring rules and records every call.
/// Pending one-shot rules win over standing rules; commands with no
/// matching rule succeed with empty output.
#[derive(Default)]
pub struct RecordingRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<ShellCommand>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every command mentioning `needle` with `output`.
    pub fn respond(&self, needle: &str, output: CommandOutput) -> &Self {
        self.push_rule(needle, output, None)
    }

    /// Answer the next command mentioning `needle` with `output`.
    pub fn respond_once(&self, needle: &str, output: CommandOutput) -> &Self {
        self.push_rule(needle, output, Some(1))
    }

    fn push_rule(&self, needle: &str, output: CommandOutput, remaining: Option<usize>) -> &Self {
        self.rules.lock().unwrap().push(Rule {
            needle: needle.to_string(),
            output,
            remaining,
        });
        self
    }

    pub fn calls(&self) -> Vec<ShellCommand> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded commands mentioning `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.mentions(needle))
            .count()
    }

    pub fn labels(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.label).collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, command: &ShellCommand) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(command.clone());
        let mut rules = self.rules.lock().unwrap();
        // one-shot rules shadow standing ones
        if let Some(rule) = rules
            .iter_mut()
            .find(|r| r.remaining.is_some_and(|n| n > 0) && command.mentions(&r.needle))
        {
            rule.remaining = rule.remaining.map(|n| n - 1);
            return Ok(rule.output.clone());
        }
        Ok(rules
            .iter()
            .find(|r| r.remaining.is_none() && command.mentions(&r.needle))
            .map(|r| r.output.clone())
            .unwrap_or_else(|| CommandOutput::ok("")))
    }
}

/// Replays canned answers; an exhausted script answers with an empty line.
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&self, message: &str) -> Result<String> {
        self.asked.lock().unwrap().push(message.to_string());
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// One request seen by [`MockCollector`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// Minimal HTTP collector on a loopback port. `GET` answers 200; the two
/// POST endpoints answer `{"status": <configured>, "content": ""}`.
pub struct MockCollector {
    pub url: String,
    requests: std::sync::Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockCollector {
    pub async fn start(fv_status: &str, log_status: &str) -> Self {
        use tokio::io::AsyncWriteExt;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = std::sync::Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();
        let fv_status = fv_status.to_string();
        let log_status = log_status.to_string();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let Ok(request) = read_request(&mut stream).await else {
                    continue;
                };
                let body = match request.path.as_str() {
                    "/api/fv" => format!(r#"{{"status":"{}","content":""}}"#, fv_status),
                    "/api/log" => format!(r#"{{"status":"{}","content":""}}"#, log_status),
                    _ => "ok".to_string(),
                };
                if request.method != "GET" {
                    recorded.lock().unwrap().push(request);
                }
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self { url, requests }
    }

    /// Recorded POST requests, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> std::io::Result<RecordedRequest> {
    use tokio::io::AsyncReadExt;

    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + 4 + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let body_end = buf.len().min(header_end + 4 + content_length);
    let body = String::from_utf8_lossy(&buf[header_end + 4..body_end]).to_string();
    Ok(RecordedRequest { method, path, body })
}
