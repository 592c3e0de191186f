//! DICOM Receiver (§4.G): a C-STORE SCP bound to one route's port and
//! AE title. Streams each instance straight to disk — the command set
//! is small and is buffered to parse the affected SOP class/instance,
//! but dataset bytes are written to the destination file PDV-by-PDV and
//! never accumulated in memory, so a multi-gigabyte instance never
//! blows the process heap budget.
//!
//! Association handling reuses the project's own synchronous
//! `dicom-ul` association idiom (`ServerAssociationOptions::establish`
//! run inside `spawn_blocking`, since the association API blocks), the
//! same pattern the standalone receiver prototypes in the retrieval
//! pack already used — generalized here to stream to disk, parse real
//! identifying tags, and hand completed instances to the Study
//! Assembler instead of writing flat timestamped files nobody groups.

use std::collections::HashMap;
use std::io::{BufWriter, Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dicom_core::Tag;
use dicom_object::{FileDicomObject, InMemDicomObject};
use dicom_ul::association::server::ServerAssociationOptions;
use dicom_ul::association::ServerAssociation;
use dicom_ul::pdu::{PDataValue, PDataValueType, Pdu};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::assembler::StudyAssembler;
use crate::error::{CoreError, Result};
use crate::model::Instance;
use crate::sop_classes::SopClassRegistry;

const STUDY_INSTANCE_UID: Tag = Tag(0x0020, 0x000D);
const SERIES_INSTANCE_UID: Tag = Tag(0x0020, 0x000E);

const COMMAND_SOP_CLASS_UID: Tag = Tag(0x0000, 0x0002);
const COMMAND_MESSAGE_ID: Tag = Tag(0x0000, 0x0110);
const AFFECTED_SOP_INSTANCE_UID: Tag = Tag(0x0000, 0x1000);
const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);

const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";

const STATUS_SUCCESS: u16 = 0x0000;
/// Out-of-resource per §6: `0xA7xx`.
const STATUS_OUT_OF_RESOURCES: u16 = 0xA700;

/// Per-instance receive state: the command set (small, buffered) plus
/// an open file the dataset is streamed into as P-DATA arrives.
struct InFlightInstance {
    command_bytes: Vec<u8>,
    command_complete: bool,
    writer: Option<BufWriter<std::fs::File>>,
    spool_path: PathBuf,
    bytes_written: u64,
}

impl InFlightInstance {
    fn new(spool_path: PathBuf) -> Self {
        Self {
            command_bytes: Vec::new(),
            command_complete: false,
            writer: None,
            spool_path,
            bytes_written: 0,
        }
    }

    fn open_writer(&mut self) -> std::io::Result<&mut BufWriter<std::fs::File>> {
        if self.writer.is_none() {
            if let Some(parent) = self.spool_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.writer = Some(BufWriter::new(std::fs::File::create(&self.spool_path)?));
        }
        Ok(self.writer.as_mut().expect("just initialized"))
    }
}

pub struct DicomReceiver {
    ae_title: String,
    base_dir: PathBuf,
    sop_registry: Arc<SopClassRegistry>,
    connection_semaphore: Arc<Semaphore>,
    assembler: Arc<StudyAssembler>,
}

impl DicomReceiver {
    pub fn new(ae_title: impl Into<String>, base_dir: impl Into<PathBuf>, worker_threads: usize, assembler: Arc<StudyAssembler>) -> Self {
        Self {
            ae_title: ae_title.into(),
            base_dir: base_dir.into(),
            sop_registry: Arc::new(SopClassRegistry::new()),
            connection_semaphore: Arc::new(Semaphore::new(worker_threads)),
            assembler,
        }
    }

    fn incoming_dir(&self) -> PathBuf {
        self.base_dir.join("incoming")
    }

    fn spool_dir(&self) -> PathBuf {
        self.base_dir.join("incoming").join("_spool")
    }

    /// Removes partially-written instances left in `incoming/_spool`
    /// from a previous, uncleanly-terminated run, once they're older
    /// than `study_timeout * 2` (§4.G).
    pub async fn gc_partial_files(&self, study_timeout: chrono::Duration) {
        let cutoff = std::time::SystemTime::now() - study_timeout.to_std().unwrap_or(Duration::from_secs(60)) * 2;
        let spool = self.spool_dir();
        let Ok(mut entries) = tokio::fs::read_dir(&spool).await else {
            return;
        };
        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(meta) = entry.metadata().await else { continue };
            let Ok(modified) = meta.modified() else { continue };
            if modified < cutoff {
                if tokio::fs::remove_file(entry.path()).await.is_ok() {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            info!(ae_title = %self.ae_title, removed, "garbage-collected stale partial instances on startup");
        }
    }

    pub async fn start(self: Arc<Self>, port: u16, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tokio::fs::create_dir_all(self.spool_dir()).await?;

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
        info!(ae_title = %self.ae_title, port, "dicom receiver listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.clone().dispatch(stream, addr),
                        Err(e) => error!(ae_title = %self.ae_title, error = %e, "accept failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(ae_title = %self.ae_title, "receiver shutting down, closing listener");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Accepts up to `worker_threads` concurrent associations; beyond
    /// that the connection is refused with a transient, out-of-resource
    /// status rather than queued unboundedly (§4.G).
    fn dispatch(self: Arc<Self>, stream: tokio::net::TcpStream, addr: std::net::SocketAddr) {
        let permit = Arc::clone(&self.connection_semaphore).try_acquire_owned();
        let Ok(permit) = permit else {
            warn!(%addr, "worker pool exhausted, refusing association");
            drop(stream);
            return;
        };

        info!(%addr, "accepted connection");
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            if let Err(e) = Self::handle_association_blocking(self, stream, addr) {
                error!(%addr, error = %e, "association ended with error");
            }
        });
    }

    fn handle_association_blocking(receiver: Arc<Self>, stream: tokio::net::TcpStream, addr: std::net::SocketAddr) -> Result<()> {
        let mut server_options = ServerAssociationOptions::new()
            .accept_called_ae_title()
            .ae_title(&receiver.ae_title)
            .promiscuous(true);

        for sop_class_uid in receiver.sop_registry.get_all_uids() {
            server_options = server_options.with_abstract_syntax(sop_class_uid);
        }

        let std_stream = stream.into_std()?;
        let mut association = match server_options.establish(std_stream) {
            Ok(a) => a,
            Err(e) => return Err(CoreError::AssociationRefused(e.to_string())),
        };

        info!(%addr, "association established");
        for pc in association.presentation_contexts() {
            debug!(%addr, pc_id = pc.id, ts = %pc.transfer_syntax, "accepted presentation context");
        }

        let rt = tokio::runtime::Handle::current();
        let result = Self::receive_loop(&receiver, &mut association, addr, &rt);

        if let Err(e) = &result {
            warn!(%addr, error = %e, "receive loop ended with error, association aborted");
        }

        result
    }

    fn receive_loop(receiver: &Arc<Self>, association: &mut ServerAssociation<TcpStream>, addr: std::net::SocketAddr, rt: &tokio::runtime::Handle) -> Result<()> {
        let mut in_flight: HashMap<u8, InFlightInstance> = HashMap::new();

        loop {
            let pdu = association
                .receive()
                .map_err(|e| CoreError::ReceiveAborted(e.to_string()))?;

            match pdu {
                Pdu::PData { data } => {
                    for pdv in &data {
                        Self::handle_pdv(receiver, &mut in_flight, pdv, rt)?;
                    }
                    Self::respond_to_completed(receiver, association, &mut in_flight, &data, rt)?;
                }
                Pdu::ReleaseRQ => {
                    let _ = association.send(&Pdu::ReleaseRP);
                    info!(%addr, "association released");
                    return Ok(());
                }
                Pdu::AbortRQ { .. } => {
                    info!(%addr, "association aborted by peer");
                    return Ok(());
                }
                other => {
                    debug!(%addr, pdu = ?other, "ignoring non-storage pdu");
                }
            }
        }
    }

    fn handle_pdv(receiver: &Arc<Self>, in_flight: &mut HashMap<u8, InFlightInstance>, pdv: &PDataValue, _rt: &tokio::runtime::Handle) -> Result<()> {
        let pc_id = pdv.presentation_context_id;

        let entry = in_flight.entry(pc_id).or_insert_with(|| {
            let spool_path = receiver.spool_dir().join(format!("{}.part", Uuid::new_v4()));
            InFlightInstance::new(spool_path)
        });

        match pdv.value_type {
            PDataValueType::Command => {
                entry.command_bytes.extend_from_slice(&pdv.data);
                if pdv.is_last {
                    entry.command_complete = true;
                }
            }
            PDataValueType::Data => {
                let writer = entry
                    .open_writer()
                    .map_err(|e| CoreError::ArchiveIOFailed(format!("opening spool file: {e}")))?;
                writer
                    .write_all(&pdv.data)
                    .map_err(|e| CoreError::ArchiveIOFailed(format!("streaming instance to disk: {e}")))?;
                entry.bytes_written += pdv.data.len() as u64;

                if pdv.is_last {
                    let writer = entry.writer.take().expect("writer opened above");
                    let file = writer.into_inner().map_err(|e| CoreError::ArchiveIOFailed(e.to_string()))?;
                    file.sync_all().map_err(|e| CoreError::ArchiveIOFailed(format!("fsync: {e}")))?;
                }
            }
        }

        Ok(())
    }

    /// Once both the command and the dataset for a presentation context
    /// have fully arrived, finalize the instance: parse identifying
    /// tags, move it into `incoming/<study_uid>/<sop_uid>.dcm`, enqueue
    /// it into the assembler, and respond with C-STORE-RSP success.
    fn respond_to_completed(receiver: &Arc<Self>, association: &mut ServerAssociation<TcpStream>, in_flight: &mut HashMap<u8, InFlightInstance>, data: &[PDataValue], rt: &tokio::runtime::Handle) -> Result<()> {
        let pc_ids: Vec<u8> = data.iter().map(|p| p.presentation_context_id).collect();

        for pc_id in pc_ids {
            let ready = matches!(in_flight.get(&pc_id), Some(e) if e.command_complete && e.writer.is_none() && e.bytes_written > 0);
            if !ready {
                continue;
            }

            let entry = in_flight.remove(&pc_id).expect("checked above");
            let (pc_transfer_syntax, pc_object_pc_id) = association
                .presentation_contexts()
                .iter()
                .find(|pc| pc.id == pc_id)
                .map(|pc| (pc.transfer_syntax.clone(), pc.id))
                .unwrap_or_default();

            let status = match receiver.finalize_instance(&entry, &pc_transfer_syntax, rt) {
                Ok(()) => STATUS_SUCCESS,
                Err(e) => {
                    warn!(error = %e, "failed to finalize received instance");
                    let _ = std::fs::remove_file(&entry.spool_path);
                    STATUS_OUT_OF_RESOURCES
                }
            };

            let message_id = parse_command(&entry.command_bytes)
                .and_then(|c| c.get(&COMMAND_MESSAGE_ID).cloned())
                .and_then(|v| u16_from_bytes(&v))
                .unwrap_or(1);

            let affected_sop_class = parse_command(&entry.command_bytes)
                .and_then(|c| c.get(&COMMAND_SOP_CLASS_UID).cloned())
                .map(|v| trimmed_string(&v))
                .unwrap_or_default();

            let response = build_c_store_response(&affected_sop_class, message_id, status);
            association
                .send(&Pdu::PData {
                    data: vec![PDataValue {
                        presentation_context_id: pc_object_pc_id,
                        value_type: PDataValueType::Command,
                        is_last: true,
                        data: response,
                    }],
                })
                .map_err(|e| CoreError::ReceiveAborted(e.to_string()))?;
        }

        Ok(())
    }

    /// The bytes in `entry.spool_path` are a bare DIMSE dataset (no
    /// preamble, no File Meta group) — exactly what rode the wire.
    /// Affected SOP Class/Instance UID come off the command set (both
    /// are Type 1 fields on C-STORE-RQ, already parsed and small);
    /// Study/Series Instance UID are scanned directly off the spool
    /// file's header elements, seeking past everything else — pixel
    /// data in particular is never read into memory here. The File
    /// Meta group is written standalone, then the dataset bytes are
    /// streamed straight from the spool file into the final one, so a
    /// multi-gigabyte instance costs a bounded copy buffer, not a
    /// whole-object decode (§4.G).
    fn finalize_instance(self: &Arc<Self>, entry: &InFlightInstance, transfer_syntax: &str, rt: &tokio::runtime::Handle) -> Result<()> {
        let command = parse_command(&entry.command_bytes).unwrap_or_default();
        let sop_class_uid = command.get(&COMMAND_SOP_CLASS_UID).map(|v| trimmed_string(v)).unwrap_or_default();
        let sop_instance_uid = command
            .get(&AFFECTED_SOP_INSTANCE_UID)
            .map(|v| trimmed_string(v))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::ReceiveAborted("missing Affected SOP Instance UID in C-STORE-RQ command set".to_string()))?;

        let mut spool_file = std::fs::File::open(&entry.spool_path)?;
        let implicit_vr = transfer_syntax == IMPLICIT_VR_LE;
        let identifying = scan_identifying_tags(&mut spool_file, implicit_vr, &[STUDY_INSTANCE_UID, SERIES_INSTANCE_UID])
            .map_err(|e| CoreError::ReceiveAborted(format!("scanning received dataset header: {e}")))?;

        let study_uid = identifying.get(&STUDY_INSTANCE_UID).map(|v| trimmed_string(v)).filter(|s| !s.is_empty()).unwrap_or_else(|| "UNKNOWN_STUDY".to_string());
        let series_uid = identifying.get(&SERIES_INSTANCE_UID).map(|v| trimmed_string(v)).filter(|s| !s.is_empty()).unwrap_or_else(|| "UNKNOWN_SERIES".to_string());

        let file_meta = dicom_object::meta::FileMetaTableBuilder::new()
            .media_storage_sop_class_uid(sop_class_uid.clone())
            .media_storage_sop_instance_uid(sop_instance_uid.clone())
            .transfer_syntax(transfer_syntax)
            .build()
            .map_err(|e| CoreError::ReceiveAborted(format!("building file meta for {sop_instance_uid}: {e}")))?;

        let final_path = self.incoming_dir().join(&study_uid).join(format!("{sop_instance_uid}.dcm"));
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let empty_header = FileDicomObject::new(InMemDicomObject::new_empty(), file_meta);
        let mut out = BufWriter::new(std::fs::File::create(&final_path)?);
        empty_header
            .write_all(&mut out)
            .map_err(|e| CoreError::ArchiveIOFailed(format!("writing file meta for {}: {e}", final_path.display())))?;

        std::io::copy(&mut spool_file, &mut out).map_err(|e| CoreError::ArchiveIOFailed(format!("streaming dataset into {}: {e}", final_path.display())))?;
        out.flush().map_err(|e| CoreError::ArchiveIOFailed(format!("flushing {}: {e}", final_path.display())))?;
        drop(out);

        std::fs::remove_file(&entry.spool_path)?;

        let file_size = std::fs::metadata(&final_path)?.len();
        let instance = Instance::new(sop_instance_uid, sop_class_uid, study_uid, series_uid, final_path, file_size);

        let assembler = Arc::clone(&self.assembler);
        let calling_ae = self.ae_title.clone();
        rt.block_on(async move {
            assembler.enqueue(&calling_ae, instance).await;
        });

        Ok(())
    }
}

/// Scans a bare (meta-free) dataset stream, from the start, for a
/// handful of short header tags, seeking past everything it isn't
/// asked for instead of reading it — stops at Pixel Data or once every
/// wanted tag has been found, then rewinds the file back to the start
/// so the caller can stream-copy the untouched bytes afterward.
fn scan_identifying_tags(file: &mut std::fs::File, implicit_vr: bool, wanted: &[Tag]) -> std::io::Result<HashMap<Tag, Vec<u8>>> {
    use std::io::{Seek, SeekFrom};

    let mut out = HashMap::new();
    let mut remaining: std::collections::HashSet<Tag> = wanted.iter().copied().collect();

    while !remaining.is_empty() {
        let mut tag_buf = [0u8; 4];
        if file.read_exact(&mut tag_buf).is_err() {
            break;
        }
        let tag = Tag(u16::from_le_bytes([tag_buf[0], tag_buf[1]]), u16::from_le_bytes([tag_buf[2], tag_buf[3]]));

        if tag == PIXEL_DATA {
            break;
        }

        let length: u64 = if implicit_vr {
            let mut len_buf = [0u8; 4];
            if file.read_exact(&mut len_buf).is_err() {
                break;
            }
            u32::from_le_bytes(len_buf) as u64
        } else {
            let mut vr_buf = [0u8; 2];
            if file.read_exact(&mut vr_buf).is_err() {
                break;
            }
            match &vr_buf {
                b"OB" | b"OW" | b"OF" | b"OD" | b"OL" | b"SQ" | b"UT" | b"UN" | b"UC" | b"UR" => {
                    let mut reserved = [0u8; 2];
                    if file.read_exact(&mut reserved).is_err() {
                        break;
                    }
                    let mut len_buf = [0u8; 4];
                    if file.read_exact(&mut len_buf).is_err() {
                        break;
                    }
                    u32::from_le_bytes(len_buf) as u64
                }
                _ => {
                    let mut len_buf = [0u8; 2];
                    if file.read_exact(&mut len_buf).is_err() {
                        break;
                    }
                    u16::from_le_bytes(len_buf) as u64
                }
            }
        };

        if remaining.remove(&tag) {
            let mut value = vec![0u8; length as usize];
            if file.read_exact(&mut value).is_err() {
                break;
            }
            out.insert(tag, value);
        } else if file.seek(SeekFrom::Current(length as i64)).is_err() {
            break;
        }
    }

    file.seek(SeekFrom::Start(0))?;
    Ok(out)
}

/// DIMSE command sets are always Implicit VR Little Endian: tag
/// (4 bytes), length (4 bytes), value. Small and fixed-shape enough
/// that a hand-rolled decoder is simpler than pulling in a dataset
/// parser for it, the same way the project's own sender builds command
/// sets by hand instead of going through the full dataset writer.
fn parse_command(bytes: &[u8]) -> Option<HashMap<Tag, Vec<u8>>> {
    let mut out = HashMap::new();
    let mut offset = 0usize;
    while offset + 8 <= bytes.len() {
        let group = u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
        let element = u16::from_le_bytes([bytes[offset + 2], bytes[offset + 3]]);
        let length = u32::from_le_bytes([bytes[offset + 4], bytes[offset + 5], bytes[offset + 6], bytes[offset + 7]]) as usize;
        offset += 8;
        if offset + length > bytes.len() {
            break;
        }
        out.insert(Tag(group, element), bytes[offset..offset + length].to_vec());
        offset += length;
    }
    Some(out)
}

fn trimmed_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_matches(|c: char| c == '\0' || c.is_whitespace()).to_string()
}

fn u16_from_bytes(bytes: &[u8]) -> Option<u16> {
    if bytes.len() < 2 {
        return None;
    }
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Builds a minimal C-STORE-RSP command set: Affected SOP Class UID,
/// Command Field (0x8001 = C-STORE-RSP), Message ID Being Responded To,
/// no-dataset flag, and the response Status.
fn build_c_store_response(affected_sop_class_uid: &str, message_id: u16, status: u16) -> Vec<u8> {
    let mut out = Vec::new();
    write_element(&mut out, COMMAND_SOP_CLASS_UID, affected_sop_class_uid.as_bytes());
    write_element(&mut out, Tag(0x0000, 0x0100), &0x8001u16.to_le_bytes());
    write_element(&mut out, COMMAND_MESSAGE_ID, &message_id.to_le_bytes());
    write_element(&mut out, Tag(0x0000, 0x0800), &0x0101u16.to_le_bytes());
    write_element(&mut out, Tag(0x0000, 0x0900), &status.to_le_bytes());
    out
}

fn write_element(out: &mut Vec<u8>, tag: Tag, value: &[u8]) {
    out.extend_from_slice(&tag.0.to_le_bytes());
    out.extend_from_slice(&tag.1.to_le_bytes());
    let mut value = value.to_vec();
    if value.len() % 2 != 0 {
        value.push(0);
    }
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(&value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn command_round_trips_through_hand_rolled_codec() {
        let bytes = build_c_store_response("1.2.840.10008.5.1.4.1.1.7", 42, STATUS_SUCCESS);
        let parsed = parse_command(&bytes).unwrap();
        assert_eq!(u16_from_bytes(parsed.get(&COMMAND_MESSAGE_ID).unwrap()), Some(42));
        assert_eq!(u16_from_bytes(parsed.get(&Tag(0x0000, 0x0900)).unwrap()), Some(STATUS_SUCCESS));
        assert_eq!(trimmed_string(parsed.get(&COMMAND_SOP_CLASS_UID).unwrap()), "1.2.840.10008.5.1.4.1.1.7");
    }

    #[tokio::test]
    async fn gc_partial_files_removes_only_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = watch::channel(false);
        let (completed_tx, _completed_rx) = mpsc::channel(8);
        let assembler = Arc::new(StudyAssembler::new("ROUTE1", chrono::Duration::seconds(30), None, dir.path().join("late-arrivals"), completed_tx));
        let _ = rx;
        let receiver = Arc::new(DicomReceiver::new("ROUTE1", dir.path(), 4, assembler));

        tokio::fs::create_dir_all(receiver.spool_dir()).await.unwrap();
        let stale = receiver.spool_dir().join("stale.part");
        tokio::fs::write(&stale, b"partial").await.unwrap();

        let old_time = std::time::SystemTime::now() - Duration::from_secs(3600);
        filetime_set(&stale, old_time);

        let fresh = receiver.spool_dir().join("fresh.part");
        tokio::fs::write(&fresh, b"partial").await.unwrap();

        receiver.gc_partial_files(chrono::Duration::seconds(30)).await;

        assert!(!stale.exists());
        assert!(fresh.exists());
    }

    fn filetime_set(path: &Path, time: std::time::SystemTime) {
        let file = std::fs::File::open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    fn implicit_vr_element(tag: Tag, value: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&tag.0.to_le_bytes());
        out.extend_from_slice(&tag.1.to_le_bytes());
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
        out.extend_from_slice(value);
        out
    }

    #[test]
    fn scan_identifying_tags_stops_before_pixel_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spool.part");

        let mut bytes = Vec::new();
        bytes.extend(implicit_vr_element(STUDY_INSTANCE_UID, b"1.2.3\0"));
        bytes.extend(implicit_vr_element(SERIES_INSTANCE_UID, b"1.2.3.4\0"));
        // A pixel data value large enough that reading it into memory
        // would be the whole point of the bug being tested for.
        bytes.extend(implicit_vr_element(PIXEL_DATA, &vec![0u8; 4096]));

        std::fs::write(&path, &bytes).unwrap();
        let mut file = std::fs::File::open(&path).unwrap();

        let found = scan_identifying_tags(&mut file, true, &[STUDY_INSTANCE_UID, SERIES_INSTANCE_UID]).unwrap();
        assert_eq!(trimmed_string(found.get(&STUDY_INSTANCE_UID).unwrap()), "1.2.3");
        assert_eq!(trimmed_string(found.get(&SERIES_INSTANCE_UID).unwrap()), "1.2.3.4");

        // Rewound to the start so the caller can stream-copy everything,
        // pixel data included, without having decoded it here.
        let mut rest = Vec::new();
        file.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, bytes);
    }
}
