//! Stage A of the ingestion pipeline: streams the XML dump and emits one
//! raw record per `<page>` element (spec section 4.3).
//!
//! The tokenizer itself (`quick_xml`) is the out-of-scope external
//! collaborator named in spec section 1; this module is the thin page-level
//! state machine the pipeline needs on top of it, grounded in the teacher's
//! `scan_pages` in `parse.rs` and in `genresinspace`'s `extract.rs` event
//! loop (`Event::Start`/`Event::Text`/`Event::End` with a `recording_*` flag
//! per field).

use std::io::BufRead;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

/// One `<page>` element's raw contents, before normalization or link
/// parsing.
#[derive(Debug, Clone)]
pub struct RawPageRecord {
    pub title: String,
    /// `Some(target)` if the page carries a `<redirect title="target"/>`.
    pub redirect: Option<String>,
    pub text: String,
}

/// Streams `reader` and invokes `on_page` once per `<page>` element found.
///
/// Runs to completion synchronously; callers that need this off the async
/// runtime's worker threads should run it inside `tokio::task::spawn_blocking`
/// (see `ingest::run_pipeline`).
pub fn scan_dump<R: BufRead, F: FnMut(RawPageRecord)>(source: R, mut on_page: F) -> anyhow::Result<()> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();

    let mut title = String::new();
    let mut recording_title = false;

    let mut text = String::new();
    let mut recording_text = false;

    let mut redirect: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => match e.name().as_ref() {
                b"page" => {
                    title.clear();
                    text.clear();
                    redirect = None;
                }
                b"title" => {
                    title.clear();
                    recording_title = true;
                }
                b"text" => {
                    text.clear();
                    recording_text = true;
                }
                _ => {}
            },
            Event::Empty(e) if e.name().as_ref() == b"redirect" => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"title" {
                        redirect = Some(attr.decode_and_unescape_value(reader.decoder())?.into_owned());
                    }
                }
            }
            Event::Text(e) => {
                let decoded = e.unescape()?;
                if recording_title {
                    title.push_str(&decoded);
                } else if recording_text {
                    text.push_str(&decoded);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"title" => recording_title = false,
                b"text" => recording_text = false,
                b"page" => {
                    on_page(RawPageRecord {
                        title: title.clone(),
                        redirect: redirect.clone(),
                        text: text.clone(),
                    });
                }
                _ => {}
            },
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}
