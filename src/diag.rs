/// An error that can suggest to the user how to resolve it.
pub trait DiagnosableError: std::error::Error {
    fn diagnose(&self) -> Vec<String> {
        vec![]
    }
}
