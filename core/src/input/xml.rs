use std::collections::BTreeMap;
use std::str::from_utf8;

use async_channel::Sender;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::PrefixDeclaration;
use quick_xml::Reader;
use tokio::io::{AsyncRead, BufReader};
use tracing::trace;

use georocket_types::{ChunkMeta, XmlChunkMeta, XmlStartElement};

use crate::error::{Error, Result};
use crate::input::SplitterResult;
use crate::util::window_read::WindowRead;

/// Splits an XML document into chunks whenever an element in the first
/// level (i.e. a child of the document's root node) is encountered. Every
/// chunk carries the chain of enclosing start tags so it can be re-embedded
/// into a valid document later.
///
/// The splitter reads in a single pass and retains at most one chunk's
/// bytes: the window is released as soon as a chunk has been emitted.
pub struct FirstLevelSplitter<R> {
    reader: Reader<BufReader<WindowRead<R>>>,
    output: Sender<SplitterResult>,

    /// The chain of currently open elements above the chunk frontier
    parents: Vec<XmlStartElement>,
}

impl<R> FirstLevelSplitter<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, output: Sender<SplitterResult>) -> Self {
        Self {
            reader: Reader::from_reader(BufReader::new(WindowRead::new(reader))),
            output,
            parents: Vec::new(),
        }
    }

    /// Split the whole input. Returns the number of chunks emitted.
    pub async fn run(mut self) -> Result<usize> {
        let mut buf = Vec::new();
        let mut chunks = 0;

        // number of open elements inside the current chunk, 0 between chunks
        let mut chunk_depth = 0usize;
        let mut chunk_start = 0usize;

        loop {
            let start_pos = self.reader.buffer_position();
            let event = self
                .reader
                .read_event_into_async(&mut buf)
                .await
                .map_err(|e| {
                    Error::malformed_input(self.reader.buffer_position(), e.to_string())
                })?;
            let end_pos = self.reader.buffer_position();

            match event {
                Event::Start(ref s) => {
                    if chunk_depth > 0 {
                        chunk_depth += 1;
                    } else if self.parents.is_empty() {
                        // the document root opens the parent chain
                        let root = to_start_element(s, &self.reader, start_pos)?;
                        self.parents.push(root);
                    } else {
                        // an element at the first-child frontier begins a chunk
                        chunk_start = start_pos;
                        chunk_depth = 1;
                    }
                }

                Event::Empty(_) => {
                    if chunk_depth == 0 && !self.parents.is_empty() {
                        // a self-closing element at the frontier is a
                        // complete chunk on its own
                        self.emit(start_pos, end_pos).await?;
                        chunks += 1;
                    }
                }

                Event::End(_) => {
                    if chunk_depth > 0 {
                        chunk_depth -= 1;
                        if chunk_depth == 0 {
                            self.emit(chunk_start, end_pos).await?;
                            chunks += 1;
                        }
                    } else if !self.parents.is_empty() {
                        self.parents.pop();
                    } else {
                        return Err(Error::malformed_input(
                            start_pos,
                            "unbalanced closing tag",
                        ));
                    }
                }

                Event::Eof => {
                    if chunk_depth > 0 || !self.parents.is_empty() {
                        return Err(Error::malformed_input(
                            end_pos,
                            "unexpected end of input, expected closing tags",
                        ));
                    }
                    break;
                }

                // characters between chunks are discarded
                _ => {}
            }

            buf.clear();
        }

        trace!(chunks, "splitter finished");
        Ok(chunks)
    }

    async fn emit(&mut self, start: usize, end: usize) -> Result<()> {
        let window = self.reader.get_mut().get_mut().window_mut();
        let chunk = window.get_bytes(start..end)?;
        window.advance_to(end)?;

        let meta = XmlChunkMeta::new(self.parents.clone(), start, end);
        self.output
            .send(SplitterResult {
                chunk,
                meta: ChunkMeta::Xml(meta),
            })
            .await
            .map_err(|_| Error::Cancelled)
    }
}

/// Extract the name, namespace declarations and attributes of a start tag
fn to_start_element<B>(
    tag: &BytesStart,
    reader: &Reader<B>,
    pos: usize,
) -> Result<XmlStartElement> {
    let name = tag.name();
    let prefix = name
        .prefix()
        .map(|p| {
            from_utf8(p.as_ref())
                .map(str::to_string)
                .map_err(|e| Error::malformed_input(pos, e.to_string()))
        })
        .transpose()?
        .unwrap_or_default();
    let local_name = from_utf8(name.local_name().as_ref())
        .map_err(|e| Error::malformed_input(pos, e.to_string()))?
        .to_string();

    let mut namespace_prefixes = BTreeMap::new();
    let mut attributes = BTreeMap::new();

    for attr in tag.attributes() {
        let attr = attr.map_err(|e| Error::malformed_input(pos, e.to_string()))?;
        let value = attr
            .decode_and_unescape_value(reader)
            .map_err(|e| Error::malformed_input(pos, e.to_string()))?
            .into_owned();

        if let Some(binding) = attr.key.as_namespace_binding() {
            let ns_prefix = match binding {
                PrefixDeclaration::Default => String::new(),
                PrefixDeclaration::Named(n) => from_utf8(n)
                    .map_err(|e| Error::malformed_input(pos, e.to_string()))?
                    .to_string(),
            };
            namespace_prefixes.insert(ns_prefix, value);
        } else {
            let key = from_utf8(attr.key.as_ref())
                .map_err(|e| Error::malformed_input(pos, e.to_string()))?
                .to_string();
            attributes.insert(key, value);
        }
    }

    Ok(XmlStartElement {
        prefix,
        local_name,
        namespace_prefixes,
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assertor::{assert_that, EqualityAssertion, VecAssertion};

    use georocket_types::ChunkMeta;

    use crate::error::Error;
    use crate::input::SplitterResult;

    use super::FirstLevelSplitter;

    const XMLHEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

    /// Split an XML string and return the emitted results
    async fn split(xml: &str) -> Result<Vec<SplitterResult>, Error> {
        let (tx, rx) = async_channel::unbounded();
        let splitter = FirstLevelSplitter::new(Cursor::new(xml.to_string()), tx);
        let handle = tokio::spawn(splitter.run());

        let mut results = Vec::new();
        while let Ok(r) = rx.recv().await {
            results.push(r);
        }

        let chunks = handle.await.unwrap()?;
        assert_eq!(chunks, results.len());
        Ok(results)
    }

    fn xml_meta(r: &SplitterResult) -> &georocket_types::XmlChunkMeta {
        match &r.meta {
            ChunkMeta::Xml(m) => m,
            _ => panic!("expected XML chunk metadata"),
        }
    }

    #[tokio::test]
    async fn one_chunk() {
        let contents = "<object><child></child></object>";
        let xml = format!("{XMLHEADER}<root>{contents}</root>");

        let results = split(&xml).await.unwrap();
        assert_that!(results).has_length(1);
        assert_that!(String::from_utf8(results[0].chunk.clone()).unwrap())
            .is_equal_to(contents.to_string());

        let meta = xml_meta(&results[0]);
        assert_that!(meta.parents).has_length(1);
        assert_that!(meta.parents[0].local_name.clone()).is_equal_to("root".to_string());
    }

    #[tokio::test]
    async fn two_chunks_with_namespaces() {
        let c1 = r#"<f id="1"/>"#;
        let c2 = r#"<f id="2"/>"#;
        let xml = format!("<?xml version=\"1.0\"?><c xmlns=\"u:a\">{c1}{c2}</c>");

        let results = split(&xml).await.unwrap();
        assert_that!(results).has_length(2);
        assert_that!(String::from_utf8(results[0].chunk.clone()).unwrap())
            .is_equal_to(c1.to_string());
        assert_that!(String::from_utf8(results[1].chunk.clone()).unwrap())
            .is_equal_to(c2.to_string());

        for r in &results {
            let meta = xml_meta(r);
            assert_that!(meta.parents).has_length(1);
            let root = &meta.parents[0];
            assert_that!(root.local_name.clone()).is_equal_to("c".to_string());
            assert_that!(root.namespace_prefixes[""].clone()).is_equal_to("u:a".to_string());
        }
    }

    /// The byte range recorded in the metadata must point at exactly the
    /// chunk's bytes in the source document
    #[tokio::test]
    async fn chunk_byte_range() {
        let xml = format!(
            "{XMLHEADER}<root a=\"1\">\n  <object><child>text</child></object>\n  <object/>\n</root>"
        );

        let results = split(&xml).await.unwrap();
        assert_that!(results).has_length(2);
        for r in &results {
            let meta = xml_meta(r);
            assert_that!(r.chunk.clone())
                .is_equal_to(xml.as_bytes()[meta.start..meta.end].to_vec());
        }
    }

    #[tokio::test]
    async fn root_attributes_and_namespaces() {
        let xml = concat!(
            r#"<core:CityModel xmlns:core="http://www.opengis.net/citygml/2.0" "#,
            r#"xmlns:gml="http://www.opengis.net/gml" id="m1">"#,
            r#"<core:cityObjectMember/></core:CityModel>"#
        );

        let results = split(xml).await.unwrap();
        let root = &xml_meta(&results[0]).parents[0];
        assert_that!(root.prefix.clone()).is_equal_to("core".to_string());
        assert_that!(root.local_name.clone()).is_equal_to("CityModel".to_string());
        assert_that!(root.namespace_prefixes["core"].clone())
            .is_equal_to("http://www.opengis.net/citygml/2.0".to_string());
        assert_that!(root.namespace_prefixes["gml"].clone())
            .is_equal_to("http://www.opengis.net/gml".to_string());
        assert_that!(root.attributes["id"].clone()).is_equal_to("m1".to_string());
    }

    /// Nested elements never become separate chunks; a chunk is the maximal
    /// element starting at the first level
    #[tokio::test]
    async fn deep_nesting() {
        let mut inner = String::from("<leaf/>");
        for i in 0..128 {
            inner = format!("<n{i}>{inner}</n{i}>");
        }
        let xml = format!("<root>{inner}</root>");

        let results = split(&xml).await.unwrap();
        assert_that!(results).has_length(1);
        assert_that!(String::from_utf8(results[0].chunk.clone()).unwrap()).is_equal_to(inner);
    }

    #[tokio::test]
    async fn empty_input() {
        let results = split("").await.unwrap();
        assert_that!(results).is_empty();
    }

    #[tokio::test]
    async fn unbalanced_tags_fail() {
        let r = split("<root><object></object>").await;
        assert!(matches!(r, Err(Error::MalformedInput { .. })));

        let r = split("<root><object></wrong></object></root>").await;
        assert!(matches!(r, Err(Error::MalformedInput { .. })));
    }

    #[tokio::test]
    async fn characters_between_chunks_are_discarded() {
        let xml = "<root>  ignored  <f/>  also ignored  </root>";
        let results = split(xml).await.unwrap();
        assert_that!(results).has_length(1);
        assert_that!(String::from_utf8(results[0].chunk.clone()).unwrap())
            .is_equal_to("<f/>".to_string());
    }
}
