pub mod client;

pub use client::{
    ApiError, AuthApi, HttpApiClient, OtpOutcome, RelayApiClient, VerificationType,
    PREDICT_ENDPOINT, TRAIN_ENDPOINT, VERIFY_ENDPOINT,
};
