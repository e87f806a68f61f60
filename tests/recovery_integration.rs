//! Integration coverage for the cross-reference engine (C4) and brute-force
//! recovery (C6) against literal byte fixtures, built the way the teacher's
//! own `tests/` directory exercises whole-document behavior rather than a
//! single module in isolation.

use pdfcore::Document;

fn xref_stream_pdf() -> Vec<u8> {
    let header = b"%PDF-1.5\n";
    let obj1 = b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n";
    let obj2 = b"2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>\nendobj\n";
    let obj3 = b"3 0 obj\n<< /Type /Page /Parent 2 0 R >>\nendobj\n";

    let mut buf = Vec::new();
    buf.extend_from_slice(header);
    let off1 = buf.len();
    buf.extend_from_slice(obj1);
    let off2 = buf.len();
    buf.extend_from_slice(obj2);
    let off3 = buf.len();
    buf.extend_from_slice(obj3);

    let xref_offset = buf.len();
    // Four entries (object 0 is the conventional free head), W = [1 4 1]:
    // each row is type(1) + offset/next-free(4) + gen(1) = 6 bytes.
    let mut rows = Vec::new();
    rows.extend_from_slice(&[0u8, 0, 0, 0, 0, 0xFF]);
    rows.extend_from_slice(&[1u8, (off1 >> 24) as u8, (off1 >> 16) as u8, (off1 >> 8) as u8, off1 as u8, 0]);
    rows.extend_from_slice(&[1u8, (off2 >> 24) as u8, (off2 >> 16) as u8, (off2 >> 8) as u8, off2 as u8, 0]);
    rows.extend_from_slice(&[1u8, (off3 >> 24) as u8, (off3 >> 16) as u8, (off3 >> 8) as u8, off3 as u8, 0]);

    let dict = format!("<< /Type /XRef /W [1 4 1] /Size 4 /Root 1 0 R /Length {} >>", rows.len());
    buf.extend_from_slice(format!("4 0 obj\n{dict}\nstream\n").as_bytes());
    buf.extend_from_slice(&rows);
    buf.extend_from_slice(b"\nendstream\nendobj\n");
    buf.extend_from_slice(format!("startxref\n{xref_offset}\n%%EOF").as_bytes());
    buf
}

fn pdf_with_garbage_prefix_and_missing_startxref() -> Vec<u8> {
    let mut buf = b"\x00\x01garbage-before-header\n".to_vec();
    buf.extend_from_slice(b"%PDF-1.4\n");
    buf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
    buf.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n");
    buf
}

#[test]
fn resolves_catalog_through_an_xref_stream() {
    let doc = Document::load_mem(xref_stream_pdf()).unwrap();
    let catalog = doc.catalog().unwrap();
    assert!(catalog.has_type(b"Catalog"));

    let pages = doc.resolve((2, 0)).unwrap();
    assert!(pages.as_dict().unwrap().has_type(b"Pages"));
}

#[test]
fn recovers_a_document_with_no_xref_at_all() {
    let doc = Document::load_mem(pdf_with_garbage_prefix_and_missing_startxref()).unwrap();
    assert!(doc.rebuilt);
    let catalog = doc.catalog().unwrap();
    assert!(catalog.has_type(b"Catalog"));
}
