use actson::feeder::PushJsonFeeder;
use actson::{JsonEvent, JsonParser};
use async_channel::Sender;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::trace;

use georocket_types::{ChunkMeta, GeoJsonChunkMeta, GeoJsonType};

use crate::error::{Error, Result};
use crate::input::SplitterResult;
use crate::util::window::Window;

/// Splits a GeoJSON document into chunks. `FeatureCollection`s and
/// `GeometryCollection`s are split into the direct children of their
/// `features`/`geometries` arrays; a lone feature or geometry becomes a
/// single chunk covering the whole top-level object.
///
/// Each chunk is classified by the first `type` member at the chunked
/// object's own top level. `type` members of nested objects are ignored.
pub struct GeoJsonSplitter<R> {
    reader: BufReader<R>,
    parser: JsonParser<PushJsonFeeder>,
    window: Window,
    output: Sender<SplitterResult>,
    eof: bool,
}

impl<R> GeoJsonSplitter<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, output: Sender<SplitterResult>) -> Self {
        Self {
            reader: BufReader::new(reader),
            parser: JsonParser::new(PushJsonFeeder::new()),
            window: Window::default(),
            output,
            eof: false,
        }
    }

    /// Split the whole input. Returns the number of chunks emitted.
    pub async fn run(mut self) -> Result<usize> {
        // find the top-level object; empty input produces no chunks
        loop {
            match self.parser.next_event() {
                Ok(Some(JsonEvent::NeedMoreInput)) => self.fill_feeder().await?,
                Ok(Some(JsonEvent::StartObject)) => break,
                Ok(None) => return Ok(0),
                Err(_) if self.is_blank_so_far() => return Ok(0),
                _ => {
                    return Err(Error::malformed_input(
                        self.parser.parsed_bytes(),
                        "expected a top-level GeoJSON object",
                    ));
                }
            }
        }

        let start = self.parser.parsed_bytes() - 1;
        let mut depth = 1u32;
        let mut kind: Option<GeoJsonType> = None;
        let mut expect_type = false;
        let mut collection_chunks: Option<usize> = None;

        loop {
            let event = self.next_event().await?;
            match event {
                Some(JsonEvent::StartObject) => {
                    depth += 1;
                    expect_type = false;
                }

                Some(JsonEvent::EndObject) => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    expect_type = false;
                }

                Some(JsonEvent::FieldName) if depth == 1 => {
                    let name = self.current_string()?;
                    match name.as_str() {
                        "type" => expect_type = true,
                        "features" | "geometries" => {
                            expect_type = false;
                            let n = self.process_collection(name).await?;
                            collection_chunks =
                                Some(collection_chunks.unwrap_or_default() + n);
                        }
                        _ => expect_type = false,
                    }
                }

                Some(JsonEvent::ValueString) if depth == 1 && expect_type => {
                    if kind.is_none() {
                        kind = Some(self.current_string()?.as_str().into());
                    }
                    expect_type = false;
                }

                None => {
                    return Err(Error::malformed_input(
                        self.parser.parsed_bytes(),
                        "unexpected end of input while reading object",
                    ));
                }

                _ => {
                    expect_type = false;
                }
            }
        }

        let chunks = match collection_chunks {
            Some(n) => {
                // the enclosing collection itself is not a chunk
                self.window.advance_to(self.parser.parsed_bytes())?;
                n
            }
            None => {
                // a lone feature or geometry is a chunk on its own
                let end = self.parser.parsed_bytes();
                self.emit(start, end, kind, None).await?;
                1
            }
        };

        trace!(chunks, "splitter finished");
        Ok(chunks)
    }

    /// Read the children of a `features` or `geometries` array and emit one
    /// chunk per child object
    async fn process_collection(&mut self, parent_field: String) -> Result<usize> {
        loop {
            match self.next_event().await? {
                Some(JsonEvent::StartArray) => break,
                None => {
                    return Err(Error::malformed_input(
                        self.parser.parsed_bytes(),
                        format!("expected an array after `{parent_field}'"),
                    ));
                }
                _ => {
                    return Err(Error::malformed_input(
                        self.parser.parsed_bytes(),
                        format!("expected an array after `{parent_field}'"),
                    ));
                }
            }
        }

        let mut chunks = 0;
        loop {
            match self.next_event().await? {
                Some(JsonEvent::EndArray) => break,
                Some(JsonEvent::StartObject) => {
                    self.read_chunk_object(&parent_field).await?;
                    chunks += 1;
                }
                None => {
                    return Err(Error::malformed_input(
                        self.parser.parsed_bytes(),
                        "unexpected end of input inside collection",
                    ));
                }
                _ => {
                    return Err(Error::malformed_input(
                        self.parser.parsed_bytes(),
                        "collections may only contain objects",
                    ));
                }
            }
        }

        Ok(chunks)
    }

    /// Read one chunk candidate object (whose `StartObject` has already
    /// been consumed), classify it by its own top-level `type` member and
    /// emit it
    async fn read_chunk_object(&mut self, parent_field: &str) -> Result<()> {
        let start = self.parser.parsed_bytes() - 1;
        let mut depth = 1u32;
        let mut kind: Option<GeoJsonType> = None;
        let mut expect_type = false;

        loop {
            let event = self.next_event().await?;
            match event {
                Some(JsonEvent::StartObject) => {
                    depth += 1;
                    expect_type = false;
                }

                Some(JsonEvent::EndObject) => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    expect_type = false;
                }

                Some(JsonEvent::FieldName) if depth == 1 => {
                    expect_type = self.current_string()? == "type";
                }

                Some(JsonEvent::ValueString) if depth == 1 && expect_type => {
                    if kind.is_none() {
                        kind = Some(self.current_string()?.as_str().into());
                    }
                    expect_type = false;
                }

                None => {
                    return Err(Error::malformed_input(
                        self.parser.parsed_bytes(),
                        "unexpected end of input while reading object",
                    ));
                }

                _ => {
                    expect_type = false;
                }
            }
        }

        let end = self.parser.parsed_bytes();
        self.emit(start, end, kind, Some(parent_field.to_string()))
            .await
    }

    async fn emit(
        &mut self,
        start: usize,
        end: usize,
        kind: Option<GeoJsonType>,
        parent_field_name: Option<String>,
    ) -> Result<()> {
        let chunk = self.window.get_bytes(start..end)?;
        self.window.advance_to(end)?;

        let meta =
            GeoJsonChunkMeta::new(kind.unwrap_or(GeoJsonType::Unknown), parent_field_name);
        self.output
            .send(SplitterResult {
                chunk,
                meta: ChunkMeta::GeoJson(meta),
            })
            .await
            .map_err(|_| Error::Cancelled)
    }

    /// Advance the parser, feeding it (and the window) more input on demand
    async fn next_event(&mut self) -> Result<Option<JsonEvent>> {
        loop {
            match self.parser.next_event() {
                Ok(Some(JsonEvent::NeedMoreInput)) => self.fill_feeder().await?,
                Ok(event) => return Ok(event),
                Err(_) => {
                    return Err(Error::malformed_input(
                        self.parser.parsed_bytes(),
                        "invalid JSON",
                    ));
                }
            }
        }
    }

    async fn fill_feeder(&mut self) -> Result<()> {
        let buf = self.reader.fill_buf().await?;
        if buf.is_empty() {
            if !self.eof {
                self.eof = true;
                self.parser.feeder.done();
            }
            return Ok(());
        }

        // only the bytes accepted by the feeder go into the window, so
        // window positions always line up with parser positions
        let pushed = self.parser.feeder.push_bytes(buf);
        self.window.extend(&buf[..pushed]);
        self.reader.consume(pushed);
        Ok(())
    }

    /// `true` while nothing but whitespace has been read
    fn is_blank_so_far(&self) -> bool {
        self.window
            .get_bytes(self.window.start()..self.window.end())
            .map(|b| b.iter().all(u8::is_ascii_whitespace))
            .unwrap_or(false)
    }

    fn current_string(&mut self) -> Result<String> {
        self.parser
            .current_str()
            .map(str::to_string)
            .map_err(|e| Error::malformed_input(self.parser.parsed_bytes(), e.to_string()))
    }
}
