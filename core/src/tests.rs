// In core/src/tests.rs
use std::fs;
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use tempfile::TempDir;

use crate::{
    document_processing::Stage,
    Error, Pipeline, PipelineConfig, Upload,
};

use fixtures::{pdf_with_pages, ScriptedClient};

pub(crate) mod fixtures {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener, TcpStream};
    use std::sync::{Arc, Mutex};
    use std::thread::{self, JoinHandle};

    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    use crate::ai_client::{AiClient, LlmGeneration, TokenUsage};
    use crate::document_processing::InstructionPayload;
    use crate::{Error, Result};

    /// Build a PDF with one page per slice; each string becomes one text line.
    pub fn pdf_with_pages(pages: &[&[&str]]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for lines in pages {
            let mut operations = Vec::new();
            for (index, line) in lines.iter().enumerate() {
                let y = 760 - (index as i64) * 18;
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
                operations.push(Operation::new("Td", vec![72.into(), y.into()]));
                operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
                operations.push(Operation::new("ET", vec![]));
            }
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    type Respond = Box<dyn Fn() -> Result<String> + Send + Sync>;

    /// Deterministic stand-in for a model provider
    pub struct ScriptedClient {
        respond: Respond,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        pub fn replying(reply: &str) -> Arc<Self> {
            let reply = reply.to_string();
            Arc::new(Self {
                respond: Box::new(move || Ok(reply.clone())),
                prompts: Mutex::new(Vec::new()),
            })
        }

        pub fn failing(error: fn() -> Error) -> Arc<Self> {
            Arc::new(Self {
                respond: Box::new(move || Err(error())),
                prompts: Mutex::new(Vec::new()),
            })
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl AiClient for Arc<ScriptedClient> {
        fn invoke(&self, payload: &InstructionPayload) -> Result<LlmGeneration> {
            self.prompts.lock().unwrap().push(payload.prompt.clone());
            Ok(LlmGeneration {
                response: (self.respond)()?,
                usage: TokenUsage {
                    prompt_tokens: 100,
                    completion_tokens: 20,
                },
            })
        }

        fn provider_name(&self) -> &'static str {
            "scripted"
        }
    }

    /// Accept one HTTP request, answer with `status` and `body`, and hand back
    /// the raw request text.
    pub fn serve_once(status: u16, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let body = body.to_string();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            let reason = if status < 400 { "OK" } else { "Error" };
            let response = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                reason,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
            request
        });

        (base, handle)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            let content_length = head
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + content_length {
                break;
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    /// A local address nothing is listening on
    pub fn unused_local_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }
}

const RESUME_RESPONSE: &str = r#"{"entries": [
    {"key": "First Name", "value": "Asha", "comment": "Asha Rao"},
    {"key": "Last Name", "value": "Rao", "comment": "Asha Rao"},
    {"key": "Designation", "value": "Analyst", "comment": "Started as an Analyst", "timeline": "FIRST"},
    {"key": "Designation", "value": "Engineering Manager", "comment": "Currently Engineering Manager", "timeline": "CURRENT"},
    {"key": "Joining Date", "value": "01/07/2019", "comment": "joined on 01/07/2019"},
    {"key": "Salary of first professional role", "value": "$45,000", "comment": "$45,000 annual salary"},
    {"key": "Certifications", "value": "AWS Solutions Architect (2022)", "comment": "AWS Solutions Architect (2022)"},
    {"key": "Certifications", "value": "Google Cloud Professional (2023)", "comment": "Google Cloud Professional (2023)"},
    {"value": "dangling"}
]}"#;

fn resume_pdf() -> Vec<u8> {
    pdf_with_pages(&[
        &["Asha Rao", "Started as an Analyst, currently Engineering Manager"],
        &["Certifications: AWS Solutions Architect (2022), Google Cloud Professional (2023)"],
    ])
}

fn config_in(dir: &TempDir) -> PipelineConfig {
    PipelineConfig {
        upload_dir: Some(dir.path().to_path_buf()),
        ..PipelineConfig::default()
    }
}

#[test]
fn pipeline_turns_resume_into_numbered_table() -> Result<()> {
    let dir = TempDir::new()?;
    let client = ScriptedClient::replying(RESUME_RESPONSE);
    let pipeline = Pipeline::new(config_in(&dir), Box::new(client.clone()))?;

    let extraction = pipeline.run(&resume_pdf())?;
    let table = &extraction.table;

    let keys: Vec<_> = table.keys().collect();
    assert_eq!(
        keys,
        vec![
            "First Name",
            "Last Name",
            "First Designation",
            "Current Designation",
            "Joining Date",
            "Salary of first professional role",
            "Salary of first professional role Currency",
            "Certifications 1",
            "Certifications 2",
        ]
    );
    let numbers: Vec<_> = table.rows().iter().map(|r| r.number).collect();
    assert_eq!(numbers, (1..=9).collect::<Vec<_>>());

    assert_eq!(table.get("Salary of first professional role").unwrap().value, "45000");
    assert_eq!(table.get("Salary of first professional role Currency").unwrap().value, "USD");
    assert_eq!(table.get("Joining Date").unwrap().value, "01/07/2019");

    // One discarded entry, one non-ISO date, two timeline qualifications
    assert_eq!(extraction.log.warnings_for(Stage::Validation).count(), 3);
    assert_eq!(extraction.log.warnings_for(Stage::Normalization).count(), 1);
    assert_eq!(extraction.usage.total(), 120);
    assert_eq!(extraction.log.model.as_deref(), Some("gemini-2.5-pro"));
    assert_eq!(extraction.log.page_count, Some(2));

    let prompts = client.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Google Cloud Professional"));
    assert!(prompts[0].contains("--- page 2 ---"));
    Ok(())
}

#[test]
fn prompt_is_identical_for_identical_documents() -> Result<()> {
    let dir = TempDir::new()?;
    let client = ScriptedClient::replying(RESUME_RESPONSE);
    let pipeline = Pipeline::new(config_in(&dir), Box::new(client.clone()))?;

    let (_, first) = pipeline.prepare(&resume_pdf())?;
    let (_, second) = pipeline.prepare(&resume_pdf())?;
    assert_eq!(first, second);
    assert_eq!(client.calls(), 0);
    Ok(())
}

#[test]
fn ai_failures_surface_unchanged_and_are_not_retried() -> Result<()> {
    let dir = TempDir::new()?;
    let client = ScriptedClient::failing(|| Error::AiServiceTimeout { seconds: 120 });
    let pipeline = Pipeline::new(config_in(&dir), Box::new(client.clone()))?;

    let err = pipeline.run(&resume_pdf()).unwrap_err();
    assert!(matches!(err, Error::AiServiceTimeout { seconds: 120 }));
    assert_eq!(client.calls(), 1);
    assert_eq!(
        serde_json::to_value(err.to_body())?,
        serde_json::json!({ "error": "AI service did not answer within 120 seconds" })
    );
    Ok(())
}

#[test]
fn unusable_answers_produce_no_table() -> Result<()> {
    let dir = TempDir::new()?;
    for (reply, expect_schema) in [("not json at all", false), (r#"{"rows": []}"#, true)] {
        let pipeline = Pipeline::new(config_in(&dir), Box::new(ScriptedClient::replying(reply)))?;
        match pipeline.run(&resume_pdf()) {
            Err(Error::SchemaViolation(_)) if expect_schema => {}
            Err(Error::MalformedAiResponse(_)) if !expect_schema => {}
            other => panic!("unexpected result for {reply:?}: {other:?}"),
        }
    }

    let pipeline = Pipeline::new(
        config_in(&dir),
        Box::new(ScriptedClient::replying(r#"{"entries": []}"#)),
    )?;
    assert!(matches!(pipeline.run(&resume_pdf()), Err(Error::EmptyExtraction)));
    Ok(())
}

#[test]
fn blank_pdf_never_reaches_the_model() -> Result<()> {
    let dir = TempDir::new()?;
    let client = ScriptedClient::replying(RESUME_RESPONSE);
    let pipeline = Pipeline::new(config_in(&dir), Box::new(client.clone()))?;

    let blank = pdf_with_pages(&[&[" "], &[]]);
    assert!(matches!(pipeline.run(&blank), Err(Error::NoExtractableText)));
    assert_eq!(client.calls(), 0);
    Ok(())
}

#[test]
fn staged_uploads_are_removed_on_success_and_failure() -> Result<()> {
    let dir = TempDir::new()?;
    let staged_files = || fs::read_dir(dir.path()).map(|entries| entries.count()).unwrap_or(0);

    let ok = Pipeline::new(config_in(&dir), Box::new(ScriptedClient::replying(RESUME_RESPONSE)))?;
    ok.process_upload(&Upload::new("resume.pdf", resume_pdf()).with_content_type("application/pdf"))?;
    assert_eq!(staged_files(), 0);

    let failing = Pipeline::new(
        config_in(&dir),
        Box::new(ScriptedClient::failing(|| {
            Error::AiServiceUnavailable("connection refused".to_string())
        })),
    )?;
    let err = failing
        .process_upload(&Upload::new("resume.pdf", resume_pdf()))
        .unwrap_err();
    assert!(matches!(err, Error::AiServiceUnavailable(_)));
    assert_eq!(staged_files(), 0);
    Ok(())
}

#[test]
fn rejected_uploads_are_never_staged() -> Result<()> {
    let dir = TempDir::new()?;
    let config = PipelineConfig {
        max_upload_bytes: 64,
        ..config_in(&dir)
    };
    let client = ScriptedClient::replying(RESUME_RESPONSE);
    let pipeline = Pipeline::new(config, Box::new(client.clone()))?;

    let err = pipeline
        .process_upload(&Upload::new("resume.pdf", resume_pdf()))
        .unwrap_err();
    assert!(matches!(err, Error::UploadTooLarge { .. }));

    let mut no_file = Upload::new("", Vec::new());
    no_file.filename = None;
    let err = pipeline.process_upload(&no_file).unwrap_err();
    assert_eq!(err.to_body().error, "No file provided");

    assert_eq!(fs::read_dir(dir.path())?.count(), 0);
    assert_eq!(client.calls(), 0);
    Ok(())
}

#[test]
fn concurrent_invocations_do_not_interfere() -> Result<()> {
    let dir = TempDir::new()?;
    let response = r#"{"entries": [
        {"key": "Designation", "value": "Manager", "timeline": "CURRENT"},
        {"key": "Designation", "value": "Analyst", "timeline": "CURRENT"}
    ]}"#;
    let pipeline = Arc::new(Pipeline::new(
        config_in(&dir),
        Box::new(ScriptedClient::replying(response)),
    )?);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            thread::spawn(move || pipeline.process_upload(&Upload::new("resume.pdf", resume_pdf())))
        })
        .collect();

    for handle in handles {
        let extraction = handle.join().expect("worker panicked")?;
        let keys: Vec<_> = extraction.table.keys().collect();
        assert_eq!(keys, vec!["Designation 1", "Designation 2"]);
    }
    assert_eq!(fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}
