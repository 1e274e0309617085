use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use super::error::FaultCodeError;

/// One decoder entry: a cavity fault's three letter code and what to do about it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FaultCode {
    #[serde(rename = "Three Letter Code")]
    pub tlc: String,
    #[serde(rename = "Long Description")]
    pub long_desc: String,
    #[serde(rename = "Generic Short Description for Decoder")]
    pub short_desc: String,
    #[serde(rename = "Recommended Corrective Actions")]
    pub corrective_action: String,
}

/// The fault decoder table, sorted by three letter code. Codes are stored uppercase.
///
/// Read from the fault spreadsheet export. Columns other than the four above are ignored.
#[derive(Debug, Clone, Default)]
pub struct FaultCodeTable {
    rows: Vec<FaultCode>,
}

impl FaultCodeTable {
    pub fn from_path(path: &Path) -> Result<Self, FaultCodeError> {
        if !path.exists() {
            return Err(FaultCodeError::BadFilePath(path.to_path_buf()));
        }
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, FaultCodeError> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut rows: Vec<FaultCode> = Vec::new();
        for record in csv_reader.deserialize() {
            let mut row: FaultCode = record?;
            // Spreadsheet exports carry blank rows between sections
            if row.tlc.is_empty() {
                continue;
            }
            row.tlc = row.tlc.to_uppercase();
            rows.push(row);
        }
        rows.sort_by(|a, b| a.tlc.cmp(&b.tlc));
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[FaultCode] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up a code, ignoring case
    pub fn lookup(&self, tlc: &str) -> Option<&FaultCode> {
        let tlc = tlc.trim().to_uppercase();
        self.rows
            .binary_search_by(|row| row.tlc.as_str().cmp(tlc.as_str()))
            .ok()
            .map(|idx| &self.rows[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TABLE: &str = "\
Three Letter Code,Long Description,Generic Short Description for Decoder,Recommended Corrective Actions,Severity
QCH,Cavity quench detected,Quench,\"Reset interlocks, then ramp slowly\",MAJOR
BCS,Beam containment system trip,BCS,Call the control room,MAJOR
,,,,
CTE,\"Comm error with the LLRF chassis\",Comms,Power cycle the chassis,MINOR
";

    #[test]
    fn test_rows_sorted_and_blank_skipped() {
        let table = FaultCodeTable::from_reader(TABLE.as_bytes()).unwrap();
        let codes: Vec<&str> = table.rows().iter().map(|r| r.tlc.as_str()).collect();
        assert_eq!(codes, vec!["BCS", "CTE", "QCH"]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_lookup() {
        let table = FaultCodeTable::from_reader(TABLE.as_bytes()).unwrap();
        let quench = table.lookup("qch").unwrap();
        assert_eq!(quench.short_desc, "Quench");
        assert_eq!(quench.corrective_action, "Reset interlocks, then ramp slowly");
        assert!(table.lookup("XYZ").is_none());
    }

    #[test]
    fn test_lowercase_codes_in_table() {
        let table_csv = "\
Three Letter Code,Long Description,Generic Short Description for Decoder,Recommended Corrective Actions
qch,Quench,Quench,Reset
Bcs,Beam containment,BCS,Call the control room
";
        let table = FaultCodeTable::from_reader(table_csv.as_bytes()).unwrap();
        assert_eq!(table.lookup("qch").unwrap().tlc, "QCH");
        assert_eq!(table.lookup("QCH").unwrap().short_desc, "Quench");
        assert_eq!(table.lookup("bCs").unwrap().corrective_action, "Call the control room");
        let codes: Vec<&str> = table.rows().iter().map(|r| r.tlc.as_str()).collect();
        assert_eq!(codes, vec!["BCS", "QCH"]);
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TABLE.as_bytes()).unwrap();
        let table = FaultCodeTable::from_path(file.path()).unwrap();
        assert_eq!(table.len(), 3);

        assert!(matches!(
            FaultCodeTable::from_path(Path::new("/no/such/faults.csv")),
            Err(FaultCodeError::BadFilePath(_))
        ));
    }

    #[test]
    fn test_missing_column_is_error() {
        let bad = "Three Letter Code,Long Description\nQCH,Quench\n";
        assert!(matches!(
            FaultCodeTable::from_reader(bad.as_bytes()),
            Err(FaultCodeError::ParsingError(_))
        ));
    }
}
