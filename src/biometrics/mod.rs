// Keystroke Guard: Behavioral Biometrics
// Vectorization, similarity scoring, capture, and enrollment

pub mod capture;
pub mod enrollment;
pub mod similarity;
pub mod vectorizer;

pub use capture::CaptureAgent;
pub use enrollment::{EnrollmentProgress, EnrollmentSession};
pub use similarity::{similarity, SimilarityTolerances};
pub use vectorizer::{match_key_pairs, vectorize, KeyPair};
