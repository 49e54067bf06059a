// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::boxes::BoxType;
use crate::writer::BoxWriter;
use crate::{
    be_u16, be_u32, box_to_vec, check_entry_count, parse_single_box, read_zero_terminated, BMFFBox, Error,
    ParseOptions, ReadBox, Result, TryString, TryVec,
};
use std::borrow::Cow;
use std::fmt;
use std::io::{Read, Write};

/// Names of the component types defined in ISO/IEC 23001-17 Table 1, indexed by type code.
static COMPONENT_TYPE_NAMES: [&str; 17] = [
    "monochrome",
    "Y",
    "Cb",
    "Cr",
    "red",
    "green",
    "blue",
    "alpha",
    "depth",
    "disparity",
    "palette",
    "filter-array",
    "padded",
    "cyan",
    "magenta",
    "yellow",
    "key (black)",
];

/// Type codes from here on are user-defined and carry a URI.
const FIRST_CUSTOM_COMPONENT_TYPE: u16 = 0x8000;

/// Human-readable name of a component type code, for diagnostics.
///
/// Codes outside the table of well-known types are rendered in hex.
#[must_use]
pub fn component_type_name(component_type: u16) -> Cow<'static, str> {
    match COMPONENT_TYPE_NAMES.get(usize::from(component_type)) {
        Some(name) => Cow::Borrowed(name),
        None => Cow::Owned(format!("0x{component_type:04x}")),
    }
}

const fn is_custom_component_type(component_type: u16) -> bool {
    component_type >= FIRST_CUSTOM_COMPONENT_TYPE
}

/// One entry of the component dictionary.
#[derive(Debug, PartialEq)]
pub struct Component {
    component_type: u16,
    /// Empty unless `component_type` is a custom type.
    component_type_uri: TryString,
}

impl Component {
    /// A component of one of the well-known types (e.g. 4 for red).
    #[must_use]
    pub fn new(component_type: u16) -> Self {
        Self {
            component_type,
            component_type_uri: TryString::new(),
        }
    }

    /// A user-defined component (type code `0x8000` or above) identified by `uri`.
    pub fn custom(component_type: u16, uri: &str) -> Result<Self> {
        let mut component_type_uri = TryString::new();
        component_type_uri.extend_from_slice(uri.as_bytes())?;
        Ok(Self {
            component_type,
            component_type_uri,
        })
    }

    #[must_use]
    pub fn component_type(&self) -> u16 {
        self.component_type
    }

    #[must_use]
    pub fn is_custom(&self) -> bool {
        is_custom_component_type(self.component_type)
    }

    /// The URI of a custom component, `None` for well-known ones.
    #[must_use]
    pub fn type_uri(&self) -> Option<&str> {
        if self.component_type_uri.is_empty() {
            return None;
        }
        std::str::from_utf8(&self.component_type_uri).ok()
    }

    #[must_use]
    pub fn type_name(&self) -> Cow<'static, str> {
        component_type_name(self.component_type)
    }

    fn check_uri(&self) -> Result<()> {
        match (self.is_custom(), self.component_type_uri.is_empty()) {
            (true, true) => Err(Error::InvalidState("custom component type without URI")),
            (false, false) => Err(Error::InvalidState("well-known component type with URI")),
            _ => Ok(()),
        }
    }
}

/// Component definition box 'cmpd'.
///
/// The position of a component in this list is the `component_index` that
/// 'uncC' refers to.
///
/// See ISO/IEC 23001-17:2024 § 5.2.1
#[derive(Debug, Default, PartialEq)]
pub struct ComponentDefinitionBox {
    components: TryVec<Component>,
}

impl ComponentDefinitionBox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a complete 'cmpd' box, header included.
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::parse_with_options(data, &ParseOptions::default())
    }

    pub fn parse_with_options(data: &[u8], options: &ParseOptions) -> Result<Self> {
        parse_single_box(data, options)
    }

    /// Borrowed view of the components, in declaration order.
    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn add_component(&mut self, component: Component) -> Result<()> {
        self.components.push(component)?;
        Ok(())
    }

    pub fn write<W: Write>(&self, writer: &mut BoxWriter<W>) -> Result<()> {
        let component_count = u32::try_from(self.components.len())
            .map_err(|_| Error::InvalidState("too many components"))?;
        writer.write_box(Self::BOX_TYPE, None, |w| {
            w.write_u32(component_count)?;
            for component in self.components.iter() {
                component.check_uri()?;
                w.write_u16(component.component_type)?;
                if component.is_custom() {
                    w.write_zero_terminated(&component.component_type_uri)?;
                }
            }
            Ok(())
        })
    }

    pub fn to_vec(&self) -> Result<std::vec::Vec<u8>> {
        box_to_vec(|w| self.write(w))
    }
}

impl ReadBox for ComponentDefinitionBox {
    const BOX_TYPE: BoxType = BoxType::ComponentDefinitionBox;

    fn read_box<T: Read>(src: &mut BMFFBox<'_, T>, _options: &ParseOptions) -> Result<Self> {
        let component_count = be_u32(src)?;
        check_entry_count(component_count, 2, src.bytes_left())?;

        let mut components = TryVec::new();
        for _ in 0..component_count {
            let component_type = be_u16(src)?;
            let component_type_uri = if is_custom_component_type(component_type) {
                let uri = read_zero_terminated(src)?;
                if uri.is_empty() {
                    return Err(Error::InvalidData("custom component type without URI"));
                }
                std::str::from_utf8(&uri)?;
                uri
            } else {
                TryString::new()
            };
            components.push(Component {
                component_type,
                component_type_uri,
            })?;
        }

        Ok(Self { components })
    }
}

impl fmt::Display for ComponentDefinitionBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Box: cmpd")?;
        for component in self.components.iter() {
            write!(f, "  component_type: {}", component.type_name())?;
            if let Some(uri) = component.type_uri() {
                write!(f, " ({uri})")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{make_box, BoxSize};

    #[test]
    fn well_known_names() {
        assert_eq!(component_type_name(0), "monochrome");
        assert_eq!(component_type_name(4), "red");
        assert_eq!(component_type_name(7), "alpha");
        assert_eq!(component_type_name(16), "key (black)");
        assert_eq!(component_type_name(17), "0x0011");
        assert_eq!(component_type_name(0x8000), "0x8000");
    }

    #[test]
    fn parse_mixed_components() {
        let data = make_box(BoxSize::Auto, b"cmpd", |s| {
            s.B32(3).B16(4).B16(0x8001).append_bytes(b"urn:custom:depth\0").B16(7)
        });
        let cmpd = ComponentDefinitionBox::parse(&data).unwrap();
        let components = cmpd.components();
        assert_eq!(components.len(), 3);
        assert_eq!(components[0].component_type(), 4);
        assert_eq!(components[0].type_uri(), None);
        assert!(components[1].is_custom());
        assert_eq!(components[1].type_uri(), Some("urn:custom:depth"));
        assert_eq!(components[2].type_name(), "alpha");
        assert_eq!(cmpd.to_vec().unwrap(), data);
    }

    #[test]
    fn count_past_end_of_box() {
        let data = make_box(BoxSize::Auto, b"cmpd", |s| s.B32(3).B16(4).B16(5));
        assert!(matches!(ComponentDefinitionBox::parse(&data), Err(Error::UnexpectedEOF)));
    }

    #[test]
    fn unterminated_uri() {
        let data = make_box(BoxSize::Auto, b"cmpd", |s| s.B32(1).B16(0x8000).append_bytes(b"urn:x"));
        assert!(matches!(ComponentDefinitionBox::parse(&data), Err(Error::UnexpectedEOF)));
    }

    #[test]
    fn empty_uri_rejected() {
        let data = make_box(BoxSize::Auto, b"cmpd", |s| s.B32(1).B16(0x8000).B8(0));
        assert!(matches!(ComponentDefinitionBox::parse(&data), Err(Error::InvalidData(_))));
    }

    #[test]
    fn invalid_utf8_uri_rejected() {
        let data = make_box(BoxSize::Auto, b"cmpd", |s| s.B32(1).B16(0x8000).B8(0xff).B8(0));
        assert!(matches!(ComponentDefinitionBox::parse(&data), Err(Error::InvalidData(_))));
    }

    #[test]
    fn wrong_box_type() {
        let data = make_box(BoxSize::Auto, b"cmpC", |s| s.B32(0));
        assert!(matches!(ComponentDefinitionBox::parse(&data), Err(Error::InvalidData(_))));
    }

    #[test]
    fn write_checks_uri_invariant() {
        let mut cmpd = ComponentDefinitionBox::new();
        cmpd.add_component(Component::new(0x8000)).unwrap();
        assert!(matches!(cmpd.to_vec(), Err(Error::InvalidState(_))));

        let mut cmpd = ComponentDefinitionBox::new();
        cmpd.add_component(Component::custom(4, "urn:not:needed").unwrap()).unwrap();
        assert!(matches!(cmpd.to_vec(), Err(Error::InvalidState(_))));

        let mut cmpd = ComponentDefinitionBox::new();
        cmpd.add_component(Component::custom(0x8000, "urn:a\0b").unwrap()).unwrap();
        assert!(matches!(cmpd.to_vec(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn empty_dictionary() {
        let cmpd = ComponentDefinitionBox::new();
        let data = cmpd.to_vec().unwrap();
        assert_eq!(data, [0, 0, 0, 12, b'c', b'm', b'p', b'd', 0, 0, 0, 0]);
        assert_eq!(ComponentDefinitionBox::parse(&data).unwrap(), cmpd);
    }

    #[test]
    fn dump() {
        let mut cmpd = ComponentDefinitionBox::new();
        cmpd.add_component(Component::new(5)).unwrap();
        cmpd.add_component(Component::custom(0x8002, "urn:ir").unwrap()).unwrap();
        let text = cmpd.to_string();
        assert!(text.contains("component_type: green"));
        assert!(text.contains("component_type: 0x8002 (urn:ir)"));
    }
}
