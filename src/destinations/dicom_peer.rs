//! DICOM peer destination (§4.D): forwards processed instances to
//! another AE via C-STORE, association-per-send, with C-ECHO used as
//! the liveness probe. Adapted from the project's own standalone DICOM
//! sender: association setup, presentation-context negotiation and the
//! raw P-DATA-TF C-STORE exchange follow that client's pattern, now
//! driven off the full SOP Class registry instead of four hardcoded
//! storage classes and run through `spawn_blocking` since `dicom-ul`'s
//! association API is synchronous.

use std::net::TcpStream;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dicom_core::value::{PrimitiveValue, Value};
use dicom_core::{DataElement, Tag, VR};
use dicom_object::open_file;
use dicom_ul::association::client::ClientAssociationOptions;
use dicom_ul::pdu::{PDataValue, PDataValueType, Pdu, PresentationContextResultReason};
use dicom_ul::ClientAssociation;
use smallvec::smallvec;
use tracing::{debug, warn};

use crate::sop_classes::SopClassRegistry;

use super::{DestinationClient, FileToSend, SendOutcome, SendParams};

const VERIFICATION_SOP_CLASS: &str = "1.2.840.10008.1.1";
const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";
const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";
const MAX_PDU_DATA_SIZE: usize = 16_000;

#[derive(Debug, Clone)]
pub struct DicomPeerConfig {
    pub name: String,
    pub calling_ae: String,
    pub called_ae: String,
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

pub struct DicomPeerClient {
    config: DicomPeerConfig,
}

impl DicomPeerClient {
    pub fn new(config: DicomPeerConfig) -> Self {
        Self { config }
    }

    fn storage_presentation_contexts(options: ClientAssociationOptions) -> ClientAssociationOptions {
        SopClassRegistry::new()
            .get_all_uids()
            .into_iter()
            .fold(options, |opts, uid| opts.with_presentation_context(uid, vec![EXPLICIT_VR_LE, IMPLICIT_VR_LE]))
    }

    fn echo_blocking(config: &DicomPeerConfig) -> Result<(), String> {
        let association = ClientAssociationOptions::new()
            .calling_ae_title(&config.calling_ae)
            .called_ae_title(&config.called_ae)
            .with_presentation_context(VERIFICATION_SOP_CLASS, vec![IMPLICIT_VR_LE])
            .establish_with(&format!("{}:{}", config.host, config.port));

        let mut association = association.map_err(|e| e.to_string())?;

        let echo_rq = build_command(&[
            (Tag(0x0000, 0x0002), VR::UI, str_value(VERIFICATION_SOP_CLASS)),
            (Tag(0x0000, 0x0100), VR::US, u16_value(0x0030)), // C-ECHO-RQ
            (Tag(0x0000, 0x0110), VR::US, u16_value(1)),
            (Tag(0x0000, 0x0800), VR::US, u16_value(0x0101)), // no dataset
        ]);

        association
            .send(&Pdu::PData {
                data: vec![PDataValue {
                    presentation_context_id: association.presentation_contexts().first().map(|pc| pc.id).unwrap_or(1),
                    value_type: PDataValueType::Command,
                    is_last: true,
                    data: echo_rq,
                }],
            })
            .map_err(|e| e.to_string())?;

        association.receive().map_err(|e| e.to_string())?;
        let _ = association.release();
        Ok(())
    }

    fn send_blocking(config: &DicomPeerConfig, files: &[FileToSend]) -> Result<usize, String> {
        let options = ClientAssociationOptions::new().calling_ae_title(&config.calling_ae).called_ae_title(&config.called_ae).max_pdu_length(65536);
        let options = Self::storage_presentation_contexts(options);

        let mut association = options.establish_with(&format!("{}:{}", config.host, config.port)).map_err(|e| e.to_string())?;

        let mut sent = 0;
        for (idx, file) in files.iter().enumerate() {
            Self::store_one(&mut association, file, idx as u16 + 1)?;
            sent += 1;
        }

        if let Err(e) = association.release() {
            warn!(destination = %config.name, error = %e, "dicom peer association release failed");
        }

        Ok(sent)
    }

    fn store_one(association: &mut ClientAssociation<TcpStream>, file: &FileToSend, message_id: u16) -> Result<(), String> {
        let obj = open_file(&file.path).map_err(|e| format!("opening {}: {e}", file.path.display()))?;

        let (pc_id, pc_transfer_syntax) = association
            .presentation_contexts()
            .iter()
            .find(|pc| pc.reason == PresentationContextResultReason::Acceptance)
            .map(|pc| (pc.id, pc.transfer_syntax.clone()))
            .ok_or_else(|| "no accepted presentation context".to_string())?;

        let ts = dicom_transfer_syntax_registry::TransferSyntaxRegistry::default()
            .get(&pc_transfer_syntax)
            .map(|t| t.erased())
            .unwrap_or_else(|| dicom_transfer_syntax_registry::entries::IMPLICIT_VR_LITTLE_ENDIAN.erased());

        let mut dataset = Vec::new();
        obj.write_dataset_with_ts(&mut dataset, &ts).map_err(|e| e.to_string())?;

        let command = build_command(&[
            (Tag(0x0000, 0x0002), VR::UI, str_value(&file.sop_class_uid)),
            (Tag(0x0000, 0x0100), VR::US, u16_value(0x0001)), // C-STORE-RQ
            (Tag(0x0000, 0x0110), VR::US, u16_value(message_id)),
            (Tag(0x0000, 0x0700), VR::US, u16_value(0x0000)),
            (Tag(0x0000, 0x1000), VR::UI, str_value(&file.sop_instance_uid)),
            (Tag(0x0000, 0x0800), VR::US, u16_value(0x0001)), // dataset present
        ]);

        association
            .send(&Pdu::PData {
                data: vec![PDataValue {
                    presentation_context_id: pc_id,
                    value_type: PDataValueType::Command,
                    is_last: true,
                    data: command,
                }],
            })
            .map_err(|e| e.to_string())?;

        let mut offset = 0;
        while offset < dataset.len() {
            let chunk_size = std::cmp::min(MAX_PDU_DATA_SIZE, dataset.len() - offset);
            let is_last = offset + chunk_size >= dataset.len();
            let chunk = dataset[offset..offset + chunk_size].to_vec();

            association
                .send(&Pdu::PData {
                    data: vec![PDataValue {
                        presentation_context_id: pc_id,
                        value_type: PDataValueType::Data,
                        is_last,
                        data: chunk,
                    }],
                })
                .map_err(|e| e.to_string())?;

            offset += chunk_size;
        }

        match association.receive() {
            Ok(Pdu::PData { data }) => {
                debug!(pdvs = data.len(), "c-store response received");
                Ok(())
            }
            Ok(other) => Err(format!("unexpected pdu in c-store response: {other:?}")),
            Err(e) => Err(e.to_string()),
        }
    }
}

fn build_command(elements: &[(Tag, VR, PrimitiveValue)]) -> Vec<u8> {
    use dicom_object::InMemDicomObject;

    let mut command_obj = InMemDicomObject::new_empty();
    for (tag, vr, value) in elements {
        command_obj.put(DataElement::new(*tag, *vr, Value::Primitive(value.clone())));
    }

    let mut buffer = Vec::new();
    command_obj
        .write_dataset_with_ts(&mut buffer, &dicom_transfer_syntax_registry::entries::IMPLICIT_VR_LITTLE_ENDIAN.erased())
        .expect("command dataset is always well-formed");
    buffer
}

fn str_value(s: &str) -> PrimitiveValue {
    PrimitiveValue::Str(s.to_string().into())
}

fn u16_value(v: u16) -> PrimitiveValue {
    PrimitiveValue::U16(smallvec![v])
}

#[async_trait]
impl DestinationClient for DicomPeerClient {
    async fn probe(&self) -> bool {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || Self::echo_blocking(&config)).await.map(|r| r.is_ok()).unwrap_or(false)
    }

    async fn send(&self, files: &[FileToSend], _params: &SendParams) -> SendOutcome {
        let start = Instant::now();

        if files.is_empty() {
            return SendOutcome::success(0, 0);
        }

        let config = self.config.clone();
        let files = files.to_vec();

        match tokio::task::spawn_blocking(move || Self::send_blocking(&config, &files)).await {
            Ok(Ok(sent)) => SendOutcome::success(sent, start.elapsed().as_millis() as u64),
            Ok(Err(e)) => SendOutcome::failure(e, true),
            Err(e) => SendOutcome::failure(format!("dicom send task panicked: {e}"), true),
        }
    }
}
