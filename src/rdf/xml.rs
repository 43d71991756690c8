use anyhow::{bail, Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;

pub const DCTERMS: &str = "http://purl.org/dc/terms/";
pub const PGTERMS: &str = "http://www.gutenberg.org/2009/pgterms/";
pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const MARCREL: &str = "http://id.loc.gov/vocabulary/relators/";

/// Namespace-resolved XML element, built once and then only queried.
#[derive(Debug, Default)]
pub struct Element {
    ns: String,
    name: String,
    attrs: Vec<Attr>,
    children: Vec<Element>,
    text: String,
}

#[derive(Debug)]
struct Attr {
    ns: String,
    name: String,
    value: String,
}

impl Element {
    fn is(&self, ns: &str, name: &str) -> bool {
        self.ns == ns && self.name == name
    }

    /// First direct child named `{ns}name`.
    pub fn find(&self, ns: &str, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(ns, name))
    }

    /// Every direct child named `{ns}name`, in document order.
    pub fn find_all<'a>(&'a self, ns: &'a str, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.is(ns, name))
    }

    /// Follow a chain of first-child steps.
    pub fn path(&self, steps: &[(&str, &str)]) -> Option<&Element> {
        steps
            .iter()
            .try_fold(self, |el, (ns, name)| el.find(ns, name))
    }

    pub fn attr(&self, ns: &str, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.ns == ns && a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Own text content, `None` when empty.
    pub fn text(&self) -> Option<&str> {
        let text = self.text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Parse a document into its root element. Mismatched or unclosed tags
/// are errors.
pub fn parse(xml: &str) -> Result<Element> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let (ns, event) = reader.read_resolved_event().context("Malformed XML")?;
        let ns = namespace(ns);
        match event {
            Event::Start(e) => stack.push(open(&reader, ns, &e)?),
            Event::Empty(e) => {
                let el = open(&reader, ns, &e)?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::End(_) => {
                let el = stack.pop().context("Unbalanced end tag")?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::Text(e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        bail!("Unclosed element <{}>", open.name);
    }
    root.context("Empty XML document")
}

fn namespace(res: ResolveResult) -> String {
    match res {
        ResolveResult::Bound(Namespace(ns)) => String::from_utf8_lossy(ns).into_owned(),
        _ => String::new(),
    }
}

fn open(reader: &NsReader<&[u8]>, ns: String, e: &BytesStart) -> Result<Element> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let (attr_ns, local) = reader.resolve_attribute(attr.key);
        attrs.push(Attr {
            ns: namespace(attr_ns),
            name: String::from_utf8_lossy(local.as_ref()).into_owned(),
            value: attr.unescape_value()?.into_owned(),
        });
    }

    Ok(Element {
        ns,
        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        attrs,
        ..Default::default()
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(el),
        None if root.is_none() => *root = Some(el),
        None => bail!("Multiple root elements"),
    }
    Ok(())
}

// ── Tests ──
