use std::fmt;

/// A single subfield of a MARC data field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subfield {
    pub code: char,
    pub data: String,
}

impl Subfield {
    pub fn new(code: char, data: impl Into<String>) -> Self {
        Self {
            code,
            data: data.into(),
        }
    }
}

/// A MARC control field (tags 001-009), carrying raw data and no subfields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlField {
    pub tag: String,
    pub data: String,
}

impl ControlField {
    pub fn new(tag: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            data: data.into(),
        }
    }
}

/// A MARC data field: tag, two indicator characters, and ordered subfields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataField {
    pub tag: String,
    pub ind1: char,
    pub ind2: char,
    pub subfields: Vec<Subfield>,
}

impl DataField {
    pub fn new(tag: impl Into<String>, ind1: char, ind2: char) -> Self {
        Self {
            tag: tag.into(),
            ind1,
            ind2,
            subfields: Vec::new(),
        }
    }

    /// Returns the first subfield with the given code, if any.
    pub fn subfield(&self, code: char) -> Option<&Subfield> {
        self.subfields.iter().find(|subfield| subfield.code == code)
    }

    /// Returns the value of the first subfield with the given code, if any.
    pub fn subfield_value(&self, code: char) -> Option<&str> {
        self.subfield(code).map(|subfield| subfield.data.as_str())
    }

    /// Replaces the value of the first subfield with the given code, or
    /// appends a new subfield when none exists.
    pub fn upsert_subfield(&mut self, code: char, value: impl Into<String>) {
        let value = value.into();
        match self
            .subfields
            .iter_mut()
            .find(|subfield| subfield.code == code)
        {
            Some(subfield) => subfield.data = value,
            None => self.subfields.push(Subfield::new(code, value)),
        }
    }

    pub fn push_subfield(&mut self, code: char, value: impl Into<String>) {
        self.subfields.push(Subfield::new(code, value));
    }
}

impl fmt::Display for DataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}{}", self.tag, self.ind1, self.ind2)?;
        for subfield in &self.subfields {
            write!(f, " ${}{}", subfield.code, subfield.data)?;
        }
        Ok(())
    }
}

/// A structured catalog record: leader, control fields, and data fields.
///
/// Field order is preserved across decode and encode; downstream consumers
/// parse some subfields by fixed offsets, so the merge must never reorder or
/// rewrite fields it did not touch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    pub leader: String,
    pub control_fields: Vec<ControlField>,
    pub data_fields: Vec<DataField>,
}

impl Record {
    pub fn new(leader: impl Into<String>) -> Self {
        Self {
            leader: leader.into(),
            control_fields: Vec::new(),
            data_fields: Vec::new(),
        }
    }

    /// Returns the data of the first control field with the given tag.
    pub fn control_field(&self, tag: &str) -> Option<&str> {
        self.control_fields
            .iter()
            .find(|field| field.tag == tag)
            .map(|field| field.data.as_str())
    }

    /// Returns the record's control number (tag 001), if present.
    pub fn control_number(&self) -> Option<&str> {
        self.control_field("001").map(str::trim)
    }

    /// Returns all data fields with the given tag, in record order.
    pub fn data_fields_with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a DataField> {
        self.data_fields.iter().filter(move |field| field.tag == tag)
    }

    pub fn add_control_field(&mut self, field: ControlField) {
        self.control_fields.push(field);
    }

    pub fn add_data_field(&mut self, field: DataField) {
        self.data_fields.push(field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_existing_subfield_in_place() {
        let mut field = DataField::new("949", ' ', ' ');
        field.push_subfield('b', "I1");
        field.push_subfield('g', "CHECKEDOUT");
        field.push_subfield('o', "3");

        field.upsert_subfield('g', "AVAILABLE");

        assert_eq!(field.subfield_value('g'), Some("AVAILABLE"));
        // The subfield keeps its position between its neighbors.
        assert_eq!(field.subfields[1].code, 'g');
        assert_eq!(field.subfields.len(), 3);
    }

    #[test]
    fn upsert_appends_when_subfield_is_missing() {
        let mut field = DataField::new("949", ' ', ' ');
        field.push_subfield('b', "I1");

        field.upsert_subfield('g', "AVAILABLE");

        assert_eq!(field.subfields.len(), 2);
        assert_eq!(field.subfields[1].code, 'g');
    }

    #[test]
    fn duplicate_subfield_codes_resolve_to_first() {
        let mut field = DataField::new("949", ' ', ' ');
        field.push_subfield('c', "first");
        field.push_subfield('c', "second");

        assert_eq!(field.subfield_value('c'), Some("first"));
    }
}
