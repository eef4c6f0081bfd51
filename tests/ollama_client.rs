use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use dataset_explorer::{LanguageModel, LlmConfig, LlmError, OllamaClient, answer_or_explain};

/// Serves a single canned HTTP response and hands back the raw request.
fn serve_once(status: &'static str, body: &'static str) -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
    let host = format!("http://{}", listener.local_addr().expect("local addr"));
    let (sender, receiver) = mpsc::channel();

    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let request = read_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.flush();
            let _ = sender.send(request);
        }
    });

    (host, receiver)
}

fn read_request(stream: &mut TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let read = match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(read) => read,
        };
        buffer.extend_from_slice(&chunk[..read]);

        let text = String::from_utf8_lossy(&buffer);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buffer.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buffer).into_owned()
}

fn client_for(host: String, timeout: Duration) -> OllamaClient {
    OllamaClient::new(LlmConfig {
        host,
        model: "test-model".to_string(),
        timeout,
    })
    .expect("build client")
}

#[test]
fn returns_trimmed_response_and_sends_fixed_options() {
    let (host, requests) = serve_once("200 OK", r#"{"response":"  two classes \n","done":true}"#);
    let client = client_for(host, Duration::from_secs(5));

    let answer = client.generate("How many classes?").expect("generate");
    assert_eq!(answer, "two classes");

    let request = requests
        .recv_timeout(Duration::from_secs(5))
        .expect("request captured");
    assert!(request.starts_with("POST /api/generate"));

    let body_start = request.find("\r\n\r\n").expect("request body") + 4;
    let body: serde_json::Value = serde_json::from_str(&request[body_start..]).expect("json body");
    assert_eq!(body["model"], "test-model");
    assert_eq!(body["prompt"], "How many classes?");
    assert_eq!(body["stream"], false);
    assert_eq!(body["options"]["temperature"], 0.1);
    assert_eq!(body["options"]["top_p"], 0.9);
    assert_eq!(body["options"]["num_predict"], 512);
}

#[test]
fn missing_response_field_is_empty_answer() {
    let (host, _requests) = serve_once("200 OK", r#"{"done":true}"#);
    let client = client_for(host, Duration::from_secs(5));

    assert_eq!(client.generate("q").expect("generate"), "");
}

#[test]
fn unreachable_server_is_connection_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let host = format!("http://{}", listener.local_addr().expect("local addr"));
    drop(listener);

    let client = client_for(host.clone(), Duration::from_secs(5));
    let err = client.generate("q").expect_err("no server is listening");

    assert_eq!(err, LlmError::ConnectionFailed { endpoint: host.clone() });
    assert_eq!(
        answer_or_explain(&client, "q"),
        format!("[LLM Error] Could not connect to Ollama at {host}. Is 'ollama serve' running?")
    );
}

#[test]
fn non_json_body_is_malformed_response() {
    let (host, _requests) = serve_once("200 OK", "<html>oops</html>");
    let client = client_for(host, Duration::from_secs(5));

    let err = client.generate("q").expect_err("body is not json");
    assert!(matches!(err, LlmError::MalformedResponse(_)));
}

#[test]
fn error_status_is_reported_with_detail() {
    let (host, _requests) = serve_once("500 Internal Server Error", r#"{"error":"model not found"}"#);
    let client = client_for(host, Duration::from_secs(5));

    let err = client.generate("q").expect_err("server error");
    let LlmError::Other(detail) = &err else {
        panic!("unexpected error: {err:?}");
    };
    assert!(detail.contains("500"));
    assert_eq!(err.to_string(), detail.as_str());
}

#[test]
fn slow_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let host = format!("http://{}", listener.local_addr().expect("local addr"));
    thread::spawn(move || {
        if let Ok((_stream, _)) = listener.accept() {
            thread::sleep(Duration::from_secs(5));
        }
    });

    let client = client_for(host, Duration::from_secs(1));
    let err = client.generate("q").expect_err("server never answers");

    let LlmError::Timeout { seconds, detail, .. } = &err else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(*seconds, 1);
    assert!(!detail.is_empty());
    assert!(err.to_string().ends_with(detail.as_str()));
}
