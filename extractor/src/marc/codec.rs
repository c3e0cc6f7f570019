//! ISO 2709 binary encoding and decoding of MARC records.
//!
//! The reader is permissive in the same spirit as the permissive stream
//! readers used around library systems: a record that fails to parse is
//! reported and skipped, and the reader resynchronizes at the next record
//! terminator so one corrupt record never aborts a bulk file.

use crate::error::{ErrorKind, ExtractResult};
use crate::extract_error;
use crate::marc::record::{ControlField, DataField, Record, Subfield};

const FIELD_TERMINATOR: u8 = 0x1e;
const RECORD_TERMINATOR: u8 = 0x1d;
const SUBFIELD_DELIMITER: u8 = 0x1f;
const LEADER_LEN: usize = 24;
const DIRECTORY_ENTRY_LEN: usize = 12;

/// Encodes a record into ISO 2709 bytes, recomputing the record length and
/// base address in the leader.
pub fn write_record(record: &Record) -> ExtractResult<Vec<u8>> {
    let mut directory = Vec::new();
    let mut field_data: Vec<u8> = Vec::new();

    let mut encode_field = |tag: &str, bytes: Vec<u8>| -> ExtractResult<()> {
        if tag.len() != 3 {
            return Err(extract_error!(
                ErrorKind::InvalidRecord,
                "MARC field tag must be three characters",
                tag
            ));
        }
        if bytes.len() > 9999 {
            return Err(extract_error!(
                ErrorKind::InvalidRecord,
                "MARC field data exceeds the ISO 2709 length limit",
                format!("tag {tag} has {} bytes", bytes.len())
            ));
        }

        directory.extend_from_slice(tag.as_bytes());
        directory.extend_from_slice(format!("{:04}", bytes.len()).as_bytes());
        directory.extend_from_slice(format!("{:05}", field_data.len()).as_bytes());
        field_data.extend_from_slice(&bytes);

        Ok(())
    };

    for field in &record.control_fields {
        let mut bytes = field.data.as_bytes().to_vec();
        bytes.push(FIELD_TERMINATOR);
        encode_field(&field.tag, bytes)?;
    }

    for field in &record.data_fields {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(field.ind1.to_string().as_bytes());
        bytes.extend_from_slice(field.ind2.to_string().as_bytes());
        for subfield in &field.subfields {
            bytes.push(SUBFIELD_DELIMITER);
            bytes.extend_from_slice(subfield.code.to_string().as_bytes());
            bytes.extend_from_slice(subfield.data.as_bytes());
        }
        bytes.push(FIELD_TERMINATOR);
        encode_field(&field.tag, bytes)?;
    }

    let base_address = LEADER_LEN + directory.len() + 1;
    let record_len = base_address + field_data.len() + 1;
    if record_len > 99999 {
        return Err(extract_error!(
            ErrorKind::InvalidRecord,
            "MARC record exceeds the ISO 2709 record length limit",
            format!("{record_len} bytes")
        ));
    }

    // Normalize the leader to exactly 24 ASCII positions before patching in
    // the computed lengths.
    let mut leader: Vec<u8> = record
        .leader
        .bytes()
        .chain(std::iter::repeat(b' '))
        .take(LEADER_LEN)
        .collect();
    leader[0..5].copy_from_slice(format!("{record_len:05}").as_bytes());
    leader[12..17].copy_from_slice(format!("{base_address:05}").as_bytes());

    let mut out = Vec::with_capacity(record_len);
    out.extend_from_slice(&leader);
    out.extend_from_slice(&directory);
    out.push(FIELD_TERMINATOR);
    out.extend_from_slice(&field_data);
    out.push(RECORD_TERMINATOR);

    Ok(out)
}

/// Decodes the first record found in `data`.
pub fn read_record(data: &[u8]) -> ExtractResult<Record> {
    let (record, _) = parse_record(data)?;
    Ok(record)
}

fn ascii_number(bytes: &[u8]) -> ExtractResult<usize> {
    let text = std::str::from_utf8(bytes)?;
    Ok(text.trim().parse::<usize>()?)
}

/// Parses one record starting at the beginning of `data` and returns it with
/// the number of bytes consumed.
fn parse_record(data: &[u8]) -> ExtractResult<(Record, usize)> {
    if data.len() < LEADER_LEN {
        return Err(extract_error!(
            ErrorKind::InvalidRecord,
            "MARC record shorter than its leader",
            format!("{} bytes", data.len())
        ));
    }

    let record_len = ascii_number(&data[0..5])?;
    let base_address = ascii_number(&data[12..17])?;
    if record_len > data.len() || base_address < LEADER_LEN + 1 || base_address > record_len {
        return Err(extract_error!(
            ErrorKind::InvalidRecord,
            "MARC leader lengths are inconsistent",
            format!("record_len={record_len} base_address={base_address}")
        ));
    }

    let leader = std::str::from_utf8(&data[0..LEADER_LEN])?.to_string();
    let mut record = Record::new(leader);

    // The directory runs from the leader to the field terminator preceding
    // the base address.
    let directory = &data[LEADER_LEN..base_address - 1];
    if directory.len() % DIRECTORY_ENTRY_LEN != 0 {
        return Err(extract_error!(
            ErrorKind::InvalidRecord,
            "MARC directory length is not a multiple of the entry size",
            format!("{} bytes", directory.len())
        ));
    }

    for entry in directory.chunks(DIRECTORY_ENTRY_LEN) {
        let tag = std::str::from_utf8(&entry[0..3])?.to_string();
        let field_len = ascii_number(&entry[3..7])?;
        let field_start = ascii_number(&entry[7..12])?;

        let start = base_address + field_start;
        let end = start + field_len;
        if end > record_len {
            return Err(extract_error!(
                ErrorKind::InvalidRecord,
                "MARC directory entry points outside the record",
                format!("tag {tag} start={field_start} len={field_len}")
            ));
        }

        let mut field_bytes = &data[start..end];
        if field_bytes.last() == Some(&FIELD_TERMINATOR) {
            field_bytes = &field_bytes[..field_bytes.len() - 1];
        }

        if tag.starts_with("00") {
            let value = std::str::from_utf8(field_bytes)?;
            record.add_control_field(ControlField::new(tag, value));
        } else {
            record.add_data_field(parse_data_field(tag, field_bytes)?);
        }
    }

    Ok((record, record_len))
}

fn parse_data_field(tag: String, bytes: &[u8]) -> ExtractResult<DataField> {
    if bytes.len() < 2 {
        return Err(extract_error!(
            ErrorKind::InvalidRecord,
            "MARC data field is missing its indicators",
            tag
        ));
    }

    let ind1 = bytes[0] as char;
    let ind2 = bytes[1] as char;
    let mut field = DataField::new(tag, ind1, ind2);

    for chunk in bytes[2..].split(|byte| *byte == SUBFIELD_DELIMITER) {
        if chunk.is_empty() {
            continue;
        }
        let text = std::str::from_utf8(chunk)?;
        let mut chars = text.chars();
        let Some(code) = chars.next() else {
            continue;
        };
        field.subfields.push(Subfield::new(code, chars.as_str()));
    }

    Ok(field)
}

/// Iterates over the records of an ISO 2709 stream.
///
/// Yields one result per physical record. On a parse failure the reader
/// resynchronizes at the byte after the next record terminator, so remaining
/// records are still produced.
pub struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn resynchronize(&mut self) {
        match self.data[self.pos..]
            .iter()
            .position(|byte| *byte == RECORD_TERMINATOR)
        {
            Some(offset) => self.pos += offset + 1,
            None => self.pos = self.data.len(),
        }
    }
}

impl Iterator for RecordReader<'_> {
    type Item = ExtractResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        // Tolerate stray padding between records.
        while self.pos < self.data.len()
            && (self.data[self.pos] == RECORD_TERMINATOR || self.data[self.pos] == b'\n')
        {
            self.pos += 1;
        }
        if self.pos >= self.data.len() {
            return None;
        }

        match parse_record(&self.data[self.pos..]) {
            Ok((record, consumed)) => {
                self.pos += consumed;
                Some(Ok(record))
            }
            Err(err) => {
                self.resynchronize();
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Record {
        let mut record = Record::new("00000cam a2200000 a 4500");
        record.add_control_field(ControlField::new("001", "12345"));
        record.add_control_field(ControlField::new("008", "230102s2023    xxu           000 0 eng d"));
        let mut title = DataField::new("245", '1', '0');
        title.push_subfield('a', "The Left Hand of Darkness /");
        title.push_subfield('c', "Ursula K. Le Guin.");
        record.add_data_field(title);
        let mut item = DataField::new("949", ' ', ' ');
        item.push_subfield('b', "I1");
        item.push_subfield('g', "CHECKEDOUT");
        record.add_data_field(item);
        record
    }

    #[test]
    fn encode_then_decode_preserves_structure() {
        let record = sample_record();
        let bytes = write_record(&record).unwrap();
        let decoded = read_record(&bytes).unwrap();

        assert_eq!(decoded.control_number(), Some("12345"));
        assert_eq!(decoded.control_fields, record.control_fields);
        assert_eq!(decoded.data_fields, record.data_fields);
        // The leader round-trips with computed lengths patched in.
        assert_eq!(&decoded.leader[5..12], &record.leader[5..12]);
    }

    #[test]
    fn encoding_is_deterministic() {
        let record = sample_record();
        assert_eq!(write_record(&record).unwrap(), write_record(&record).unwrap());
    }

    #[test]
    fn reader_yields_all_records_of_a_stream() {
        let mut bytes = write_record(&sample_record()).unwrap();
        let mut second = sample_record();
        second.control_fields[0].data = "67890".to_string();
        bytes.extend(write_record(&second).unwrap());

        let records: Vec<_> = RecordReader::new(&bytes).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].as_ref().unwrap().control_number(), Some("67890"));
    }

    #[test]
    fn reader_skips_a_corrupt_record_and_resynchronizes() {
        let mut bytes = b"garbage that is definitely not a marc leader".to_vec();
        bytes.push(RECORD_TERMINATOR);
        bytes.extend(write_record(&sample_record()).unwrap());

        let records: Vec<_> = RecordReader::new(&bytes).collect();
        assert_eq!(records.len(), 2);
        assert!(records[0].is_err());
        assert_eq!(records[1].as_ref().unwrap().control_number(), Some("12345"));
    }

    #[test]
    fn oversized_field_is_rejected() {
        let mut record = sample_record();
        let mut big = DataField::new("500", ' ', ' ');
        big.push_subfield('a', "x".repeat(10_000));
        record.add_data_field(big);

        let err = write_record(&record).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRecord);
    }
}
