//! XMLTV guide filtering.
//!
//! The guide is streamed through `quick-xml` while tracking element depth.
//! Only direct children of the root are inspected; anything deeper is kept as
//! the opaque byte range of its depth-1 ancestor, so retained `<channel>` and
//! `<programme>` elements are copied byte for byte from the input.

use std::ops::Range;

use quick_xml::Reader;
use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

use crate::{ChannelTarget, GuideError};

/// Declaration written at the top of every filtered guide.
pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retain {
    Channel,
    Programme,
}

/// A depth-1 element whose end tag has not been seen yet.
struct OpenElement {
    start: usize,
    retain: Option<Retain>,
}

/// Bytes of the root start tag (`<tv ...>`) and of its name.
struct Root {
    start_tag: Vec<u8>,
    name: Vec<u8>,
}

impl Root {
    fn new(element: &BytesStart<'_>) -> Self {
        let mut start_tag = Vec::with_capacity(element.len() + 2);
        start_tag.push(b'<');
        start_tag.extend_from_slice(element);
        start_tag.push(b'>');
        Self {
            start_tag,
            name: element.name().as_ref().to_vec(),
        }
    }
}

fn position(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

/// Unescaped value of the attribute whose local name is `name`.
fn attribute_value(element: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, GuideError> {
    let mut attributes = element.attributes();
    attributes.with_checks(false);

    for attr in attributes {
        let attr = attr?;
        if attr.key.local_name().as_ref() == name {
            let raw = std::str::from_utf8(&attr.value)?;
            return Ok(Some(unescape(raw)?.into_owned()));
        }
    }
    Ok(None)
}

/// Bookkeeping for one filter pass.
struct Selection<'t> {
    target: &'t ChannelTarget,
    channel: Option<Range<usize>>,
    programmes: Vec<Range<usize>>,
}

impl<'t> Selection<'t> {
    fn new(target: &'t ChannelTarget) -> Self {
        Self {
            target,
            channel: None,
            programmes: Vec::new(),
        }
    }

    /// Decide whether a depth-1 element is worth keeping.
    fn classify(&self, element: &BytesStart<'_>) -> Result<Option<Retain>, GuideError> {
        match element.local_name().as_ref() {
            b"channel" if self.channel.is_none() => {
                let id = attribute_value(element, b"id")?;
                Ok((id.as_deref() == Some(self.target.id.as_str())).then_some(Retain::Channel))
            }
            b"programme" => {
                let channel = attribute_value(element, b"channel")?;
                Ok((channel.as_deref() == Some(self.target.id.as_str()))
                    .then_some(Retain::Programme))
            }
            _ => Ok(None),
        }
    }

    fn keep(&mut self, retain: Retain, span: Range<usize>) {
        match retain {
            // Later channels with the same id are never classified as retained.
            Retain::Channel => self.channel = Some(span),
            Retain::Programme => self.programmes.push(span),
        }
    }
}

/// Filter an XMLTV document down to a single channel.
///
/// The output holds the root element with its original attributes, the first
/// `<channel>` whose `id` equals `target.id` (or a synthesized one carrying
/// `target.name` as display name) and every `<programme>` whose `channel`
/// attribute equals `target.id`, in document order.
pub fn filter(raw: &[u8], target: &ChannelTarget) -> Result<Vec<u8>, GuideError> {
    // The reader skips a BOM without counting it in `buffer_position`, so
    // drop it here to keep positions aligned with the slices taken from `raw`.
    let raw = raw.strip_prefix(UTF8_BOM).unwrap_or(raw);
    let mut reader = Reader::from_reader(raw);
    let mut selection = Selection::new(target);
    let mut root: Option<Root> = None;
    let mut open: Option<OpenElement> = None;
    let mut depth = 0usize;

    loop {
        let event = reader.read_event().map_err(|source| GuideError::Syntax {
            position: position(&reader),
            source,
        })?;
        let end = position(&reader);

        match event {
            Event::Start(element) => {
                match depth {
                    0 => root = Some(Root::new(&element)),
                    1 => {
                        open = Some(OpenElement {
                            // `<` + tag content + `>`
                            start: end - (element.len() + 2),
                            retain: selection.classify(&element)?,
                        });
                    }
                    _ => {}
                }
                depth += 1;
            }
            Event::Empty(element) => match depth {
                0 => {
                    root = Some(Root::new(&element));
                    break;
                }
                1 => {
                    if let Some(retain) = selection.classify(&element)? {
                        // `<` + tag content + `/>`
                        selection.keep(retain, end - (element.len() + 3)..end);
                    }
                }
                _ => {}
            },
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                match depth {
                    0 => break,
                    1 => {
                        if let Some(OpenElement {
                            start,
                            retain: Some(retain),
                        }) = open.take()
                        {
                            selection.keep(retain, start..end);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => {
                if let Some(root) = &root
                    && depth > 0
                {
                    return Err(GuideError::UnexpectedEof {
                        element: String::from_utf8_lossy(&root.name).into_owned(),
                    });
                }
                break;
            }
            _ => {}
        }
    }

    let root = root.ok_or(GuideError::MissingRoot)?;

    debug!(
        channel_found = selection.channel.is_some(),
        programmes = selection.programmes.len(),
        "Filtered XMLTV guide"
    );

    let retained: usize = selection.programmes.iter().map(|span| span.len()).sum();
    let mut output =
        Vec::with_capacity(XML_DECLARATION.len() + root.start_tag.len() + retained + 256);
    output.extend_from_slice(XML_DECLARATION.as_bytes());
    output.extend_from_slice(&root.start_tag);
    output.push(b'\n');

    match selection.channel {
        Some(span) => output.extend_from_slice(&raw[span]),
        None => output.extend_from_slice(synthesize_channel(target).as_bytes()),
    }
    output.push(b'\n');

    for span in selection.programmes {
        output.extend_from_slice(&raw[span]);
        output.push(b'\n');
    }

    output.extend_from_slice(b"</");
    output.extend_from_slice(&root.name);
    output.push(b'>');

    Ok(output)
}

/// Minimal channel element used when the guide has no entry for the target.
fn synthesize_channel(target: &ChannelTarget) -> String {
    format!(
        "<channel id=\"{}\"><display-name>{}</display-name></channel>",
        escape(target.id.as_str()),
        escape(target.name.as_str())
    )
}
