use async_trait::async_trait;
use quick_xml::escape::escape;
use tokio::io::AsyncWriteExt;

use georocket_types::{ChunkMeta, XmlStartElement};

use crate::error::{Error, Result};

use super::{write_all, MergeSink, Merger};

const XML_DECLARATION: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>";

/// Merges XML chunks back into one document. The chain of parent elements
/// recorded in each chunk's metadata is kept open across chunks: chains are
/// compared structurally, a shared prefix stays open, and only the
/// divergent suffix is closed and reopened. Namespace declarations already
/// made by an open ancestor are not repeated.
#[derive(Default)]
pub struct XmlMerger {
    /// The currently open parent chain
    open: Vec<XmlStartElement>,
    started: bool,
}

impl XmlMerger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Merger for XmlMerger {
    async fn merge(&mut self, chunk: &[u8], meta: &ChunkMeta, out: &mut MergeSink) -> Result<()> {
        let parents = match meta {
            ChunkMeta::Xml(m) => &m.parents,
            _ => {
                return Err(Error::UnsupportedMimeType {
                    mime: meta.mime_type().to_string(),
                })
            }
        };

        if !self.started {
            self.started = true;
            write_all(out, XML_DECLARATION).await?;
        }

        // keep the structurally identical prefix of the previous chain open
        let common = self
            .open
            .iter()
            .zip(parents.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let closers: Vec<String> = self
            .open
            .drain(common..)
            .rev()
            .map(|el| format!("</{}>", el.name()))
            .collect();
        for closer in closers {
            write_all(out, closer.as_bytes()).await?;
        }

        for el in &parents[common..] {
            let tag = start_tag(el, &self.open);
            write_all(out, tag.as_bytes()).await?;
            self.open.push(el.clone());
        }

        write_all(out, chunk).await
    }

    async fn finish(&mut self, out: &mut MergeSink) -> Result<()> {
        let closers: Vec<String> = self
            .open
            .drain(..)
            .rev()
            .map(|el| format!("</{}>", el.name()))
            .collect();
        for closer in closers {
            write_all(out, closer.as_bytes()).await?;
        }
        out.flush().await?;
        Ok(())
    }
}

/// Render a start tag, omitting namespace declarations an open ancestor
/// already made with the same value
fn start_tag(el: &XmlStartElement, in_scope: &[XmlStartElement]) -> String {
    let mut tag = format!("<{}", el.name());

    for (prefix, uri) in &el.namespace_prefixes {
        let declared = in_scope
            .iter()
            .any(|a| a.namespace_prefixes.get(prefix) == Some(uri));
        if declared {
            continue;
        }
        if prefix.is_empty() {
            tag.push_str(&format!(" xmlns=\"{}\"", escape(uri)));
        } else {
            tag.push_str(&format!(" xmlns:{}=\"{}\"", prefix, escape(uri)));
        }
    }

    for (key, value) in &el.attributes {
        tag.push_str(&format!(" {}=\"{}\"", key, escape(value)));
    }

    tag.push('>');
    tag
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::io::Cursor;

    use pretty_assertions::assert_eq;

    use georocket_types::{ChunkMeta, XmlChunkMeta, XmlStartElement};

    use crate::output::Merger;

    use super::XmlMerger;

    fn element(
        local_name: &str,
        namespaces: &[(&str, &str)],
        attributes: &[(&str, &str)],
    ) -> XmlStartElement {
        XmlStartElement {
            prefix: String::new(),
            local_name: local_name.to_string(),
            namespace_prefixes: namespaces
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn meta(parents: Vec<XmlStartElement>) -> ChunkMeta {
        ChunkMeta::Xml(XmlChunkMeta::new(parents, 0, 0))
    }

    async fn merge_all(chunks: &[(&str, ChunkMeta)]) -> String {
        let mut out = Cursor::new(Vec::new());
        let mut merger = XmlMerger::new();
        for (chunk, m) in chunks {
            merger.merge(chunk.as_bytes(), m, &mut out).await.unwrap();
        }
        merger.finish(&mut out).await.unwrap();
        String::from_utf8(out.into_inner()).unwrap()
    }

    #[tokio::test]
    async fn simple() {
        let m = meta(vec![element("root", &[], &[])]);
        let s = merge_all(&[
            (r#"<test chunk="1"></test>"#, m.clone()),
            (r#"<test chunk="2"></test>"#, m),
        ])
        .await;
        assert_eq!(
            s,
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<root><test chunk="1"></test><test chunk="2"></test></root>"#
            )
        );
    }

    #[tokio::test]
    async fn namespaces_written_once() {
        let m = meta(vec![element(
            "c",
            &[("", "u:a"), ("gml", "http://www.opengis.net/gml")],
            &[],
        )]);
        let s = merge_all(&[(r#"<f id="1"/>"#, m.clone()), (r#"<f id="2"/>"#, m)]).await;
        assert_eq!(
            s,
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<c xmlns="u:a" xmlns:gml="http://www.opengis.net/gml">"#,
                r#"<f id="1"/><f id="2"/></c>"#
            )
        );
    }

    #[tokio::test]
    async fn diverging_parent_chains() {
        let root = element("root", &[], &[]);
        let m1 = meta(vec![root.clone(), element("groupA", &[], &[])]);
        let m2 = meta(vec![root, element("groupB", &[], &[])]);

        let s = merge_all(&[("<f/>", m1.clone()), ("<g/>", m1), ("<h/>", m2)]).await;
        assert_eq!(
            s,
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                "<root><groupA><f/><g/></groupA><groupB><h/></groupB></root>"
            )
        );
    }

    #[tokio::test]
    async fn nested_namespace_not_repeated() {
        let root = element("root", &[("gml", "http://www.opengis.net/gml")], &[]);
        let group = element("group", &[("gml", "http://www.opengis.net/gml")], &[]);
        let m = meta(vec![root, group]);

        let s = merge_all(&[("<f/>", m)]).await;
        assert_eq!(
            s,
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<root xmlns:gml="http://www.opengis.net/gml"><group><f/></group></root>"#
            )
        );
    }

    #[tokio::test]
    async fn attributes_are_escaped() {
        let m = meta(vec![element("root", &[], &[("title", "a<b&\"c\"")])]);
        let s = merge_all(&[("<f/>", m)]).await;
        assert_eq!(
            s,
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<root title="a&lt;b&amp;&quot;c&quot;"><f/></root>"#
            )
        );
    }

    #[tokio::test]
    async fn no_chunks_no_output() {
        let s = merge_all(&[]).await;
        assert_eq!(s, "");
    }
}
