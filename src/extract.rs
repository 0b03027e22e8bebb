use anyhow::{bail, Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// One flattened financial-instrument entry from a FIRDS delta report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentRecord {
    pub id: String,
    pub full_name: String,
    pub classification: String,
    pub notional_currency: String,
    pub commodity_derivative: String,
    pub issuer: String,
}

/// Leaf fields captured while walking one instrument wrapper.
#[derive(Debug, Default)]
struct PartialRecord {
    id: Option<String>,
    full_name: Option<String>,
    classification: Option<String>,
    notional_currency: Option<String>,
    commodity_derivative: Option<String>,
    issuer: Option<String>,
}

impl PartialRecord {
    fn finish(self, wrapper: &str) -> Result<InstrumentRecord> {
        let field = |v: Option<String>, name: &str| {
            v.with_context(|| format!("{} record is missing {}", wrapper, name))
        };
        Ok(InstrumentRecord {
            id: field(self.id, "FinInstrmGnlAttrbts/Id")?,
            full_name: field(self.full_name, "FinInstrmGnlAttrbts/FullNm")?,
            classification: field(self.classification, "FinInstrmGnlAttrbts/ClssfctnTp")?,
            notional_currency: field(self.notional_currency, "FinInstrmGnlAttrbts/NtnlCcy")?,
            commodity_derivative: field(
                self.commodity_derivative,
                "FinInstrmGnlAttrbts/CmmdtyDerivInd",
            )?,
            issuer: field(self.issuer, "Issr")?,
        })
    }
}

enum Field {
    Id,
    FullNm,
    ClssfctnTp,
    NtnlCcy,
    CmmdtyDerivInd,
    Issr,
}

const REPORT_PATH: [&str; 4] = ["BizData", "Pyld", "Document", "FinInstrmRptgRefDataDltaRpt"];

/// Parse the extracted FIRDS payload and flatten every instrument wrapper
/// under `BizData/Pyld/Document/FinInstrmRptgRefDataDltaRpt/FinInstrm` into a
/// six-field record, in document order.
///
/// The wrapper element name is arbitrary (`NewRcrd`, `ModfdRcrd`,
/// `TermntdRcrd`, ...); each `FinInstrm` is expected to hold exactly one.
/// Malformed XML, a document without the report path, or a wrapper missing
/// any of the six fields all fail the run.
pub fn parse_instruments(path: impl AsRef<Path>) -> Result<Vec<InstrumentRecord>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = Reader::from_reader(BufReader::new(file));
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut buf = Vec::new();
    let mut stack: Vec<String> = Vec::new();

    let mut saw_report = false;
    // wrapper element name + fields collected so far
    let mut current: Option<(String, PartialRecord)> = None;
    let mut pending: Option<Field> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .with_context(|| format!("malformed XML in {}", path.display()))?;
        match event {
            Event::Start(e) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                stack.push(tag);
                let p: Vec<&str> = stack.iter().map(|s| s.as_str()).collect();

                pending = None;
                match p.as_slice() {
                    ["BizData", "Pyld", "Document", "FinInstrmRptgRefDataDltaRpt"] => {
                        saw_report = true;
                    }
                    ["BizData", "Pyld", "Document", "FinInstrmRptgRefDataDltaRpt", "FinInstrm", wrapper] => {
                        current = Some((wrapper.to_string(), PartialRecord::default()));
                    }
                    ["BizData", "Pyld", "Document", "FinInstrmRptgRefDataDltaRpt", "FinInstrm", _, "FinInstrmGnlAttrbts", field] => {
                        pending = match *field {
                            "Id" => Some(Field::Id),
                            "FullNm" => Some(Field::FullNm),
                            "ClssfctnTp" => Some(Field::ClssfctnTp),
                            "NtnlCcy" => Some(Field::NtnlCcy),
                            "CmmdtyDerivInd" => Some(Field::CmmdtyDerivInd),
                            _ => None,
                        };
                    }
                    ["BizData", "Pyld", "Document", "FinInstrmRptgRefDataDltaRpt", "FinInstrm", _, "Issr"] => {
                        pending = Some(Field::Issr);
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                if let (Some(field), Some((_, rec))) = (pending.take(), current.as_mut()) {
                    let text = e.unescape()?.to_string();
                    match field {
                        Field::Id => rec.id = Some(text),
                        Field::FullNm => rec.full_name = Some(text),
                        Field::ClssfctnTp => rec.classification = Some(text),
                        Field::NtnlCcy => rec.notional_currency = Some(text),
                        Field::CmmdtyDerivInd => rec.commodity_derivative = Some(text),
                        Field::Issr => rec.issuer = Some(text),
                    }
                }
            }
            Event::End(_) => {
                pending = None;
                let p: Vec<&str> = stack.iter().map(|s| s.as_str()).collect();
                if matches!(
                    p.as_slice(),
                    ["BizData", "Pyld", "Document", "FinInstrmRptgRefDataDltaRpt", "FinInstrm", _]
                ) {
                    if let Some((wrapper, rec)) = current.take() {
                        records.push(rec.finish(&wrapper)?);
                    }
                }
                stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_report {
        bail!(
            "{} does not contain a {} report",
            path.display(),
            REPORT_PATH.join("/")
        );
    }

    debug!(records = records.len(), "instrument records extracted");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    const SAMPLE_PAYLOAD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<BizData xmlns="urn:iso:std:iso:20022:tech:xsd:head.003.001.01">
  <Hdr>
    <AppHdr>ignored</AppHdr>
  </Hdr>
  <Pyld>
    <Document xmlns="urn:iso:std:iso:20022:tech:xsd:auth.036.001.02">
      <FinInstrmRptgRefDataDltaRpt>
        <FinInstrm>
          <TermntdRcrd>
            <FinInstrmGnlAttrbts>
              <Id>DE000A1R07V3</Id>
              <FullNm>Kreditanst.f.Wiederaufbau Anl.v.2014</FullNm>
              <ClssfctnTp>DBFTFB</ClssfctnTp>
              <NtnlCcy>EUR</NtnlCcy>
              <CmmdtyDerivInd>false</CmmdtyDerivInd>
            </FinInstrmGnlAttrbts>
            <Issr>549300GDPG70E3MBBU98</Issr>
            <TradgVnRltdAttrbts>
              <Id>XFRA</Id>
            </TradgVnRltdAttrbts>
          </TermntdRcrd>
        </FinInstrm>
        <FinInstrm>
          <NewRcrd>
            <FinInstrmGnlAttrbts>
              <Id>PLPKO0000074</Id>
              <FullNm>PKO BP SA</FullNm>
              <ClssfctnTp>ESVUFR</ClssfctnTp>
              <NtnlCcy>PLN</NtnlCcy>
              <CmmdtyDerivInd>true</CmmdtyDerivInd>
            </FinInstrmGnlAttrbts>
            <Issr>259400L3KBYEVNHEJF55</Issr>
          </NewRcrd>
        </FinInstrm>
      </FinInstrmRptgRefDataDltaRpt>
    </Document>
  </Pyld>
</BizData>"#;

    fn write_payload(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("DLTINS_20210117_01of01.xml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn flattens_wrappers_in_document_order() {
        let (_dir, path) = write_payload(SAMPLE_PAYLOAD);
        let records = parse_instruments(&path).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].id, "DE000A1R07V3");
        assert_eq!(records[0].full_name, "Kreditanst.f.Wiederaufbau Anl.v.2014");
        assert_eq!(records[0].classification, "DBFTFB");
        assert_eq!(records[0].notional_currency, "EUR");
        assert_eq!(records[0].commodity_derivative, "false");
        assert_eq!(records[0].issuer, "549300GDPG70E3MBBU98");

        assert_eq!(records[1].id, "PLPKO0000074");
        assert_eq!(records[1].issuer, "259400L3KBYEVNHEJF55");
    }

    #[test]
    fn venue_level_id_does_not_clobber_instrument_id() {
        // TradgVnRltdAttrbts also carries an <Id>; only the one under
        // FinInstrmGnlAttrbts may be captured.
        let (_dir, path) = write_payload(SAMPLE_PAYLOAD);
        let records = parse_instruments(&path).unwrap();
        assert_eq!(records[0].id, "DE000A1R07V3");
    }

    #[test]
    fn missing_field_fails_with_its_name() {
        let payload = SAMPLE_PAYLOAD.replace("<NtnlCcy>PLN</NtnlCcy>", "");
        let (_dir, path) = write_payload(&payload);
        let err = parse_instruments(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("NtnlCcy"));
    }

    #[test]
    fn document_without_report_path_is_an_error() {
        let (_dir, path) = write_payload("<BizData><Pyld><Document/></Pyld></BizData>");
        let err = parse_instruments(&path).unwrap_err();
        assert!(err.to_string().contains("FinInstrmRptgRefDataDltaRpt"));
    }

    #[test]
    fn report_with_no_instruments_yields_empty_list() {
        let payload = r#"<BizData><Pyld><Document>
            <FinInstrmRptgRefDataDltaRpt></FinInstrmRptgRefDataDltaRpt>
        </Document></Pyld></BizData>"#;
        let (_dir, path) = write_payload(payload);
        assert!(parse_instruments(&path).unwrap().is_empty());
    }

    #[test]
    fn mismatched_tags_fail_fast() {
        let (_dir, path) = write_payload("<BizData><Pyld></Document></BizData>");
        assert!(parse_instruments(&path).is_err());
    }
}
