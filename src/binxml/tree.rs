//! Materialized XML node tree, used for structured field extraction.
//!
//! The streaming writer is the low-allocation path for XML output; this
//! builder consumes the same visitor events and keeps the element tree
//! around so callers can walk it.

use std::rc::Rc;

use crate::err::Result;
use crate::xml_output::{BinXmlOutput, XmlElement};

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element {
        name: Rc<str>,
        attributes: Vec<(Rc<str>, String)>,
        children: Vec<XmlNode>,
    },
    Text(String),
    CData(String),
    EntityRef(String),
    CharRef(u16),
    ProcessingInstruction {
        target: String,
        data: String,
    },
}

impl XmlNode {
    pub fn name(&self) -> Option<&str> {
        match self {
            XmlNode::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn attribute(&self, wanted: &str) -> Option<&str> {
        match self {
            XmlNode::Element { attributes, .. } => attributes
                .iter()
                .find(|(name, _)| &**name == wanted)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    pub fn children(&self) -> &[XmlNode] {
        match self {
            XmlNode::Element { children, .. } => children,
            _ => &[],
        }
    }

    pub fn child_element(&self, wanted: &str) -> Option<&XmlNode> {
        self.children()
            .iter()
            .find(|child| child.name() == Some(wanted))
    }

    /// Concatenated direct text content (text, CDATA, resolved char refs).
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in self.children() {
            match child {
                XmlNode::Text(s) | XmlNode::CData(s) => out.push_str(s),
                XmlNode::CharRef(v) => {
                    if let Some(c) = char::from_u32(u32::from(*v)) {
                        out.push(c);
                    }
                }
                _ => {}
            }
        }
        out
    }
}

#[derive(Default)]
pub struct TreeBuilder {
    roots: Vec<XmlNode>,
    stack: Vec<XmlNode>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        TreeBuilder::default()
    }

    pub fn into_nodes(self) -> Vec<XmlNode> {
        self.roots
    }

    fn push_node(&mut self, node: XmlNode) {
        match self.stack.last_mut() {
            Some(XmlNode::Element { children, .. }) => children.push(node),
            _ => self.roots.push(node),
        }
    }

    fn element_node(element: &XmlElement) -> XmlNode {
        XmlNode::Element {
            name: element.name.clone(),
            attributes: element
                .attributes
                .iter()
                .map(|attr| (attr.name.clone(), attr.value.clone()))
                .collect(),
            children: Vec::new(),
        }
    }
}

impl BinXmlOutput for TreeBuilder {
    fn visit_start_of_stream(&mut self) -> Result<()> {
        Ok(())
    }

    fn visit_end_of_stream(&mut self) -> Result<()> {
        // Unbalanced opens only occur on records that already failed.
        while let Some(node) = self.stack.pop() {
            self.push_node(node);
        }
        Ok(())
    }

    fn visit_open_start_element(&mut self, element: &XmlElement) -> Result<()> {
        self.stack.push(Self::element_node(element));
        Ok(())
    }

    fn visit_empty_element(&mut self, element: &XmlElement) -> Result<()> {
        self.push_node(Self::element_node(element));
        Ok(())
    }

    fn visit_close_element(&mut self, _name: &str) -> Result<()> {
        if let Some(node) = self.stack.pop() {
            self.push_node(node);
        }
        Ok(())
    }

    fn visit_characters(&mut self, text: &str) -> Result<()> {
        if !text.is_empty() {
            self.push_node(XmlNode::Text(text.to_string()));
        }
        Ok(())
    }

    fn visit_cdata_section(&mut self, text: &str) -> Result<()> {
        self.push_node(XmlNode::CData(text.to_string()));
        Ok(())
    }

    fn visit_entity_reference(&mut self, name: &str) -> Result<()> {
        self.push_node(XmlNode::EntityRef(name.to_string()));
        Ok(())
    }

    fn visit_character_reference(&mut self, value: u16) -> Result<()> {
        self.push_node(XmlNode::CharRef(value));
        Ok(())
    }

    fn visit_processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.push_node(XmlNode::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        });
        Ok(())
    }
}
