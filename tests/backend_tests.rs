use photoscribe::backend::{InferenceBackend, LmStudioBackend};
use serde_json::Value;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

/// `(method and path, JSON body)` of every request the server answered.
type Requests = Arc<Mutex<Vec<(String, Value)>>>;

fn reply_for(path: &str) -> (&'static str, &'static str) {
    match path {
        "/v1/models" => ("200 OK", r#"{"data":[{"id":"vision"},{"id":"writer"}]}"#),
        "/api/v1/models/load" => ("200 OK", r#"{"instance_id":"writer:2","status":"loaded"}"#),
        "/api/v1/models/unload" => ("200 OK", r#"{"instance_id":"writer:2"}"#),
        _ => ("404 Not Found", r#"{"error":"unknown endpoint"}"#),
    }
}

fn handle(stream: TcpStream, requests: &Requests) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let mut length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':')
            && name.eq_ignore_ascii_case("content-length")
        {
            length = value.trim().parse().unwrap_or(0);
        }
    }
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body)?;

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    requests
        .lock()
        .unwrap()
        .push((format!("{method} {path}"), json));

    let (status, reply) = reply_for(&path);
    let mut out = stream;
    write!(
        out,
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{reply}",
        reply.len()
    )?;
    out.flush()
}

/// A model server on a free local port. Runs until the test process exits.
fn serve() -> (String, Requests) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let requests: Requests = Arc::default();
    let seen = Arc::clone(&requests);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let _ = handle(stream, &seen);
        }
    });
    (url, requests)
}

fn paths(requests: &Requests) -> Vec<String> {
    requests
        .lock()
        .unwrap()
        .iter()
        .map(|(p, _)| p.clone())
        .collect()
}

// --- model loading ---

#[test]
fn test_load_with_context_length_loads_new_instance() {
    let (url, requests) = serve();
    let backend = LmStudioBackend::new(&url);

    let model = backend.load_model("writer", false, Some(8192)).unwrap();

    assert_eq!(model.name, "writer:2");
    assert_eq!(model.context_size, Some(8192));
    assert!(model.loaded_by_us);
    assert_eq!(
        paths(&requests),
        vec!["GET /v1/models", "POST /api/v1/models/load"]
    );
    let body = requests.lock().unwrap()[1].1.clone();
    assert_eq!(body["model"], "writer");
    assert_eq!(body["context_length"], 8192);
}

#[test]
fn test_load_without_context_length_uses_server_model() {
    let (url, requests) = serve();
    let backend = LmStudioBackend::new(&format!("{url}/v1/"));

    let model = backend.load_model("vision", false, None).unwrap();

    assert_eq!(model.name, "vision");
    assert_eq!(model.context_size, None);
    assert!(!model.loaded_by_us);
    assert_eq!(paths(&requests), vec!["GET /v1/models"]);
}

#[test]
fn test_unknown_model_is_not_loaded() {
    let (url, requests) = serve();
    let backend = LmStudioBackend::new(&url);

    assert!(backend.load_model("missing", false, Some(4096)).is_none());
    assert_eq!(paths(&requests), vec!["GET /v1/models"]);
}

#[test]
fn test_unreachable_server_loads_nothing() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    assert!(LmStudioBackend::new(&url).load_model("vision", false, None).is_none());
}

// --- cleanup ---

#[test]
fn test_cleanup_unloads_only_our_instance() {
    let (url, requests) = serve();
    let backend = LmStudioBackend::new(&url);

    backend.cleanup(false, "vision", false);
    assert!(paths(&requests).is_empty());

    backend.cleanup(true, "writer:2", false);
    assert_eq!(paths(&requests), vec!["POST /api/v1/models/unload"]);
    assert_eq!(requests.lock().unwrap()[0].1["instance_id"], "writer:2");
}
