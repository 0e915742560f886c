pub mod domain;
pub mod intake;
pub mod ports;
pub mod workflow;

pub use domain::{
    CredentialPair, Credentials, MedicineDraft, MedicineItem, NewPrescription, OcrUpload,
    ParsedMedicine, ParsedPrescription, Prescription, PrescriptionId, PrescriptionStatus,
    ProfileUpdate, Registration, Role, SessionUser, UploadFile, UploadId, UploadStatus, UserId,
    UserSummary,
};
pub use intake::{validate_selection, FileRejection, PrescriptionDraft, ValidationError, MAX_UPLOAD_BYTES};
pub use ports::{
    ApiRequest, ApiResponse, HttpMethod, HttpTransport, PortError, PortResult, RequestBody,
    TokenStore,
};
pub use workflow::{
    authorize, available_actions, confirms_transition, ActionDenied, WorkflowAction,
};
