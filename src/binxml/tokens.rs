/// A raw BinXml token byte, decoded.
///
/// Token identity lives in the low five bits; bit `0x40` flags a variant
/// (`OpenStartElement` carries attributes, `Value`/`Attribute` signal that
/// more data follows).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawToken {
    EndOfStream,
    OpenStartElement { has_attributes: bool },
    CloseStartElement,
    CloseEmptyElement,
    EndElement,
    Value { more: bool },
    Attribute { more: bool },
    CDataSection,
    CharRef,
    EntityRef,
    PITarget,
    PIData,
    TemplateInstance,
    NormalSubstitution,
    OptionalSubstitution,
    FragmentHeader,
}

impl RawToken {
    pub fn from_u8(byte: u8) -> Option<RawToken> {
        let flagged = byte & 0x40 != 0;

        match byte & 0x1f {
            0x00 if byte == 0x00 => Some(RawToken::EndOfStream),
            0x01 => Some(RawToken::OpenStartElement {
                has_attributes: flagged,
            }),
            0x02 => Some(RawToken::CloseStartElement),
            0x03 => Some(RawToken::CloseEmptyElement),
            0x04 => Some(RawToken::EndElement),
            0x05 => Some(RawToken::Value { more: flagged }),
            0x06 => Some(RawToken::Attribute { more: flagged }),
            0x07 => Some(RawToken::CDataSection),
            0x08 => Some(RawToken::CharRef),
            0x09 => Some(RawToken::EntityRef),
            0x0a => Some(RawToken::PITarget),
            0x0b => Some(RawToken::PIData),
            0x0c => Some(RawToken::TemplateInstance),
            0x0d => Some(RawToken::NormalSubstitution),
            0x0e => Some(RawToken::OptionalSubstitution),
            0x0f => Some(RawToken::FragmentHeader),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RawToken::EndOfStream => "EndOfStream",
            RawToken::OpenStartElement { .. } => "OpenStartElement",
            RawToken::CloseStartElement => "CloseStartElement",
            RawToken::CloseEmptyElement => "CloseEmptyElement",
            RawToken::EndElement => "EndElement",
            RawToken::Value { .. } => "Value",
            RawToken::Attribute { .. } => "Attribute",
            RawToken::CDataSection => "CDataSection",
            RawToken::CharRef => "CharRef",
            RawToken::EntityRef => "EntityRef",
            RawToken::PITarget => "PITarget",
            RawToken::PIData => "PIData",
            RawToken::TemplateInstance => "TemplateInstance",
            RawToken::NormalSubstitution => "NormalSubstitution",
            RawToken::OptionalSubstitution => "OptionalSubstitution",
            RawToken::FragmentHeader => "FragmentHeader",
        }
    }
}
