//! # Entry Records
//!
//! An [`EntryRecord`] is everything the archive stream says about one entry
//! except its payload: the raw header block, plus the full name, link target
//! and PAX extension records that the `tar` crate folds into the entry.
//!
//! Records are serialized in the archive format itself, so a metadata file is
//! a header-only tar fragment: optional PAX / GNU long-name extension entries
//! followed by the original header block, byte for byte. The same encoding is
//! used when [`ArchiveWriter`] re-emits the stream on join.

use std::borrow::Cow;
use std::io::{self, Read, Write};

use tar::{EntryType, Header};

const BLOCK_SIZE: u64 = 512;
const LONG_LINK_NAME: &[u8] = b"././@LongLink";
const PAX_HEADER_NAME: &[u8] = b"././@PaxHeader";

/// Coarse classification of an entry, deciding what Split puts in the data tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Directory,
    Symlink,
    /// Hard links, devices, fifos and anything else: metadata only.
    Other(u8),
}

impl EntryKind {
    fn classify(header: &Header, name: &[u8]) -> Self {
        match header.entry_type() {
            EntryType::Directory => EntryKind::Directory,
            EntryType::Symlink => EntryKind::Symlink,
            // Pre-POSIX archives mark directories with a trailing slash only.
            EntryType::Regular | EntryType::Continuous if name.ends_with(b"/") => EntryKind::Directory,
            EntryType::Regular | EntryType::Continuous => EntryKind::Regular,
            other => EntryKind::Other(other.as_byte()),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            EntryKind::Regular => "regular file",
            EntryKind::Directory => "directory",
            EntryKind::Symlink => "symlink",
            EntryKind::Other(_) => "special file",
        }
    }
}

/// Metadata of a single archive entry. Immutable once read.
#[derive(Debug, Clone)]
pub struct EntryRecord {
    header: Header,
    name: Vec<u8>,
    link_name: Option<Vec<u8>>,
    pax: Vec<(Vec<u8>, Vec<u8>)>,
}

impl EntryRecord {
    /// Captures the metadata of `entry` without touching its payload.
    pub fn from_entry<R: Read>(entry: &mut tar::Entry<'_, R>) -> io::Result<Self> {
        let header = entry.header().clone();
        let name = entry.path_bytes().into_owned();
        let link_name = entry.link_name_bytes().map(Cow::into_owned);
        let mut pax = Vec::new();
        if let Some(extensions) = entry.pax_extensions()? {
            for ext in extensions {
                let ext = ext?;
                pax.push((ext.key_bytes().to_vec(), ext.value_bytes().to_vec()));
            }
        }
        Ok(EntryRecord { header, name, link_name, pax })
    }

    /// Reads the first record of a tar fragment (a stored metadata file).
    /// Returns `Ok(None)` when the fragment holds no header at all.
    pub fn read_from<R: Read>(src: R) -> io::Result<Option<Self>> {
        let mut archive = tar::Archive::new(src);
        let mut entries = archive.entries()?;
        let record = match entries.next() {
            Some(entry) => Some(EntryRecord::from_entry(&mut entry?)?),
            None => None,
        };
        Ok(record)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The full entry name as stored in the archive, not normalized.
    pub fn name_bytes(&self) -> &[u8] {
        &self.name
    }

    /// The entry name, if it is valid UTF-8.
    pub fn name(&self) -> Option<&str> {
        std::str::from_utf8(&self.name).ok()
    }

    /// Lossy form of the name for log lines and error messages.
    pub fn display_name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    pub fn link_target_bytes(&self) -> Option<&[u8]> {
        self.link_name.as_deref()
    }

    pub fn link_target(&self) -> Option<&str> {
        self.link_name.as_deref().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn kind(&self) -> EntryKind {
        EntryKind::classify(&self.header, &self.name)
    }

    /// Declared payload size. A PAX `size` record overrides the header field.
    pub fn size(&self) -> io::Result<u64> {
        match self.pax_value(b"size") {
            Some(v) => std::str::from_utf8(v)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "invalid PAX size record")),
            None => self.header.size(),
        }
    }

    pub fn mode(&self) -> io::Result<u32> {
        self.header.mode()
    }

    pub fn mtime(&self) -> io::Result<u64> {
        self.header.mtime()
    }

    pub fn uid(&self) -> io::Result<u64> {
        self.header.uid()
    }

    pub fn gid(&self) -> io::Result<u64> {
        self.header.gid()
    }

    pub fn username(&self) -> Option<&str> {
        match self.pax_value(b"uname") {
            Some(v) => std::str::from_utf8(v).ok(),
            None => self.header.username().ok().flatten(),
        }
    }

    pub fn groupname(&self) -> Option<&str> {
        match self.pax_value(b"gname") {
            Some(v) => std::str::from_utf8(v).ok(),
            None => self.header.groupname().ok().flatten(),
        }
    }

    fn pax_value(&self, key: &[u8]) -> Option<&[u8]> {
        self.pax.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v.as_slice())
    }

    /// Writes the record as archive blocks: extension entries first (when the
    /// header alone cannot carry the full name, target or PAX records), then
    /// the header block exactly as it was read. No payload is written.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        if !self.pax.is_empty() {
            let mut data = Vec::new();
            for (key, value) in &self.pax {
                data.extend_from_slice(&pax_record(key, value));
            }
            write_extension(w, PAX_HEADER_NAME, EntryType::XHeader, &data)?;
        }
        if self.pax_value(b"path").is_none() && &*self.header.path_bytes() != self.name.as_slice() {
            write_extension(w, LONG_LINK_NAME, EntryType::GNULongName, &nul_terminated(&self.name))?;
        }
        if let Some(link) = &self.link_name {
            let in_header = self.header.link_name_bytes();
            if self.pax_value(b"linkpath").is_none() && in_header.as_deref() != Some(link.as_slice()) {
                write_extension(w, LONG_LINK_NAME, EntryType::GNULongLink, &nul_terminated(link))?;
            }
        }
        w.write_all(self.header.as_bytes())
    }
}

fn nul_terminated(bytes: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(bytes.len() + 1);
    data.extend_from_slice(bytes);
    data.push(0);
    data
}

// Extension blocks are encoded here rather than through `tar::Builder`: the
// builder rewrites path and checksum fields of the header it is given, and
// appends end-of-archive blocks on drop, which neither a stored record nor a
// failed join may carry.

/// One `"<len> <key>=<value>\n"` PAX record; `len` counts itself.
fn pax_record(key: &[u8], value: &[u8]) -> Vec<u8> {
    let rest = key.len() + value.len() + 3;
    let mut len = rest + rest.to_string().len();
    loop {
        let next = rest + len.to_string().len();
        if next == len {
            break;
        }
        len = next;
    }
    let mut out = format!("{len} ").into_bytes();
    out.extend_from_slice(key);
    out.push(b'=');
    out.extend_from_slice(value);
    out.push(b'\n');
    out
}

fn write_extension<W: Write>(w: &mut W, name: &[u8], kind: EntryType, data: &[u8]) -> io::Result<()> {
    let mut header = if kind == EntryType::XHeader { Header::new_ustar() } else { Header::new_gnu() };
    header.as_old_mut().name[..name.len()].copy_from_slice(name);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_size(data.len() as u64);
    header.set_entry_type(kind);
    header.set_cksum();
    w.write_all(header.as_bytes())?;
    w.write_all(data)?;
    pad(w, data.len() as u64)
}

fn pad<W: Write>(w: &mut W, len: u64) -> io::Result<()> {
    let rem = (len % BLOCK_SIZE) as usize;
    if rem != 0 {
        w.write_all(&[0u8; BLOCK_SIZE as usize][..BLOCK_SIZE as usize - rem])?;
    }
    Ok(())
}

/// Emits an archive stream record by record.
///
/// The end-of-archive marker is written only by [`ArchiveWriter::finish`];
/// dropping the writer after a failure leaves the stream without a trailer.
pub struct ArchiveWriter<W: Write> {
    inner: W,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(inner: W) -> Self {
        ArchiveWriter { inner }
    }

    pub fn append_record(&mut self, record: &EntryRecord) -> io::Result<()> {
        record.write_to(&mut self.inner)
    }

    /// Copies exactly `size` bytes from `src`, then pads to the block size.
    /// A source shorter than `size` is an `UnexpectedEof` error.
    pub fn append_payload<R: Read>(&mut self, src: R, size: u64) -> io::Result<()> {
        let copied = io::copy(&mut src.take(size), &mut self.inner)?;
        if copied != size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("payload ended after {copied} of {size} bytes"),
            ));
        }
        pad(&mut self.inner, size)
    }

    /// Writes the two zero blocks that end an archive and flushes.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.write_all(&[0u8; 2 * BLOCK_SIZE as usize])?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_archive() -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(11);
        header.set_mode(0o644);
        header.set_uid(1000);
        header.set_gid(100);
        header.set_username("alice").unwrap();
        header.set_groupname("users").unwrap();
        header.set_mtime(1_400_000_000);
        builder.append_data(&mut header, "etc/resolv.conf", &b"nameserver "[..]).unwrap();

        let long_name = format!("deep/{}/file.txt", "x".repeat(150));
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(3);
        header.set_mode(0o600);
        builder.append_data(&mut header, &long_name, &b"abc"[..]).unwrap();

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        header.set_link_name("busybox").unwrap();
        builder.append_data(&mut header, "bin/sh", io::empty()).unwrap();

        builder.into_inner().unwrap()
    }

    fn records_of(bytes: &[u8]) -> Vec<EntryRecord> {
        let mut archive = tar::Archive::new(bytes);
        archive
            .entries()
            .unwrap()
            .map(|e| EntryRecord::from_entry(&mut e.unwrap()).unwrap())
            .collect()
    }

    #[test]
    fn captures_header_fields() {
        let records = records_of(&sample_archive());
        assert_eq!(records.len(), 3);

        let conf = &records[0];
        assert_eq!(conf.name(), Some("etc/resolv.conf"));
        assert_eq!(conf.kind(), EntryKind::Regular);
        assert_eq!(conf.size().unwrap(), 11);
        assert_eq!(conf.mode().unwrap(), 0o644);
        assert_eq!(conf.uid().unwrap(), 1000);
        assert_eq!(conf.gid().unwrap(), 100);
        assert_eq!(conf.username(), Some("alice"));
        assert_eq!(conf.groupname(), Some("users"));
        assert_eq!(conf.mtime().unwrap(), 1_400_000_000);

        assert!(records[1].name().unwrap().ends_with("/file.txt"));
        assert!(records[1].name().unwrap().len() > 100);

        assert_eq!(records[2].kind(), EntryKind::Symlink);
        assert_eq!(records[2].link_target(), Some("busybox"));
    }

    #[test]
    fn stored_record_reads_back_identically() {
        for record in records_of(&sample_archive()) {
            let mut blob = Vec::new();
            record.write_to(&mut blob).unwrap();
            assert_eq!(blob.len() % 512, 0);

            let back = EntryRecord::read_from(blob.as_slice()).unwrap().unwrap();
            assert_eq!(back.header().as_bytes()[..], record.header().as_bytes()[..]);
            assert_eq!(back.name_bytes(), record.name_bytes());
            assert_eq!(back.link_target_bytes(), record.link_target_bytes());
            assert_eq!(back.size().unwrap(), record.size().unwrap());
        }
    }

    #[test]
    fn empty_fragment_has_no_record() {
        assert!(EntryRecord::read_from(&[0u8; 1024][..]).unwrap().is_none());
        assert!(EntryRecord::read_from(&[][..]).unwrap().is_none());
    }

    #[test]
    fn pax_records_survive() {
        let mut builder = tar::Builder::new(Vec::new());
        builder
            .append_pax_extensions([("user.comment", &b"hello"[..]), ("uname", &b"bob"[..])])
            .unwrap();
        let mut header = Header::new_ustar();
        header.set_entry_type(EntryType::Regular);
        header.set_size(0);
        builder.append_data(&mut header, "notes", io::empty()).unwrap();
        let bytes = builder.into_inner().unwrap();

        let record = records_of(&bytes).remove(0);
        assert_eq!(record.username(), Some("bob"));

        let mut blob = Vec::new();
        record.write_to(&mut blob).unwrap();
        let back = EntryRecord::read_from(blob.as_slice()).unwrap().unwrap();
        assert_eq!(back.username(), Some("bob"));
        assert_eq!(back.name(), Some("notes"));
    }

    #[test]
    fn pax_record_length_counts_itself() {
        assert_eq!(pax_record(b"path", b"a"), b"9 path=a\n".to_vec());
        // 3 + 4 + 93 = 100 bytes of body, so the length needs three digits.
        let rec = pax_record(b"path", &[b'x'; 93]);
        assert!(rec.starts_with(b"103 "));
        assert_eq!(rec.len(), 103);
    }

    #[test]
    fn writer_pads_and_terminates() {
        let records = records_of(&sample_archive());
        let mut writer = ArchiveWriter::new(Vec::new());
        writer.append_record(&records[0]).unwrap();
        writer.append_payload(&b"nameserver "[..], 11).unwrap();
        let out = writer.finish().unwrap();
        assert_eq!(out.len(), 512 + 512 + 1024);

        let mut archive = tar::Archive::new(out.as_slice());
        let mut entries = archive.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content, "nameserver ");
    }

    #[test]
    fn short_payload_is_an_error() {
        let mut writer = ArchiveWriter::new(Vec::new());
        let err = writer.append_payload(&b"abc"[..], 10).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
