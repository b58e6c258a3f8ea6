//! SAX-style output sink for the BinXml interpreter.
//!
//! The interpreter emits element/attribute/text events; [`XmlOutput`]
//! adapts them onto `quick-xml`'s writer to produce the canonical XML
//! rendering of a record. The materialized counterpart lives in
//! [`crate::binxml::tree`].

use std::io::Write;
use std::rc::Rc;

use quick_xml::Writer;
use quick_xml::events::{BytesCData, BytesEnd, BytesPI, BytesStart, BytesText, Event};

use crate::err::Result;
use crate::parser::ParserSettings;

#[derive(Debug, Clone, PartialEq)]
pub struct XmlAttribute {
    pub name: Rc<str>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: Rc<str>,
    pub attributes: Vec<XmlAttribute>,
}

pub trait BinXmlOutput {
    /// Called once per fragment, before any other event.
    fn visit_start_of_stream(&mut self) -> Result<()>;

    /// Called once when EOF is reached.
    fn visit_end_of_stream(&mut self) -> Result<()>;

    /// Called on `<Tag attr="value">`; the body follows.
    fn visit_open_start_element(&mut self, element: &XmlElement) -> Result<()>;

    /// Called on `<Tag attr="value"/>`; there is no body and no close event.
    fn visit_empty_element(&mut self, element: &XmlElement) -> Result<()>;

    /// Called on `</Tag>`.
    fn visit_close_element(&mut self, name: &str) -> Result<()>;

    /// Called with the text content of an element.
    fn visit_characters(&mut self, text: &str) -> Result<()>;

    fn visit_cdata_section(&mut self, text: &str) -> Result<()>;

    /// Emits `&name;`.
    fn visit_entity_reference(&mut self, name: &str) -> Result<()>;

    /// Emits `&#value;`.
    fn visit_character_reference(&mut self, value: u16) -> Result<()>;

    fn visit_processing_instruction(&mut self, target: &str, data: &str) -> Result<()>;
}

pub struct XmlOutput<W: Write> {
    writer: Writer<W>,
}

impl<W: Write> XmlOutput<W> {
    pub fn with_writer(target: W, settings: &ParserSettings) -> Self {
        let writer = if settings.should_indent() {
            Writer::new_with_indent(target, b' ', 2)
        } else {
            Writer::new(target)
        };

        XmlOutput { writer }
    }

    pub fn into_writer(self) -> W {
        self.writer.into_inner()
    }

    fn start_tag(element: &XmlElement) -> BytesStart<'_> {
        let mut event = BytesStart::new(&*element.name);
        for attr in &element.attributes {
            event.push_attribute((&*attr.name, attr.value.as_str()));
        }
        event
    }
}

impl<W: Write> BinXmlOutput for XmlOutput<W> {
    fn visit_start_of_stream(&mut self) -> Result<()> {
        // Individual records carry no XML declaration.
        Ok(())
    }

    fn visit_end_of_stream(&mut self) -> Result<()> {
        self.writer.write_event(Event::Eof)?;
        Ok(())
    }

    fn visit_open_start_element(&mut self, element: &XmlElement) -> Result<()> {
        self.writer.write_event(Event::Start(Self::start_tag(element)))?;
        Ok(())
    }

    fn visit_empty_element(&mut self, element: &XmlElement) -> Result<()> {
        self.writer.write_event(Event::Empty(Self::start_tag(element)))?;
        Ok(())
    }

    fn visit_close_element(&mut self, name: &str) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn visit_characters(&mut self, text: &str) -> Result<()> {
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        Ok(())
    }

    fn visit_cdata_section(&mut self, text: &str) -> Result<()> {
        self.writer.write_event(Event::CData(BytesCData::new(text)))?;
        Ok(())
    }

    fn visit_entity_reference(&mut self, name: &str) -> Result<()> {
        let reference = format!("&{name};");
        // Already escaped; write through untouched.
        self.writer
            .write_event(Event::Text(BytesText::from_escaped(&reference)))?;
        Ok(())
    }

    fn visit_character_reference(&mut self, value: u16) -> Result<()> {
        let reference = format!("&#{value};");
        self.writer
            .write_event(Event::Text(BytesText::from_escaped(&reference)))?;
        Ok(())
    }

    fn visit_processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        let content = if data.is_empty() {
            target.to_string()
        } else {
            format!("{target} {data}")
        };
        self.writer.write_event(Event::PI(BytesPI::new(&content)))?;
        Ok(())
    }
}
