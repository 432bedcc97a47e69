use thiserror::Error;

/// Refusal from a [`JobAssembler`]. Aborts the transaction that triggered
/// the rebuild, so no version or content mutation survives it.
#[derive(Debug, Error)]
#[error("Assembly failed: {reason}")]
pub struct AssemblyError {
    pub reason: String,
}

impl AssemblyError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// One function's current source, as handed to the assembler.
#[derive(Debug, Clone)]
pub struct FunctionSource {
    pub name: String,
    pub source: String,
}

/// Rebuilds a job's single executable unit from its functions' current
/// versions.
///
/// The host framework owns the actual codegen; this contract only fixes
/// *when* it runs (synchronously, after every function mutation) and what a
/// failure means (the mutation rolls back and the previous unit stays
/// current).
pub trait JobAssembler: Send + Sync {
    fn assemble(
        &self,
        job_id: &str,
        functions: &[FunctionSource],
    ) -> std::result::Result<String, AssemblyError>;
}

/// Default assembler: deterministic concatenation with section markers.
///
/// Good enough for hosts whose runner evaluates the unit as a script; real
/// deployments substitute their own codegen.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionAssembler;

impl JobAssembler for SectionAssembler {
    fn assemble(
        &self,
        job_id: &str,
        functions: &[FunctionSource],
    ) -> std::result::Result<String, AssemblyError> {
        let mut unit = format!("// unit {job_id}\n");
        for function in functions {
            unit.push_str(&format!("\n// === {} ===\n{}", function.name, function.source));
            if !function.source.ends_with('\n') {
                unit.push('\n');
            }
        }
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_are_ordered_and_labeled() {
        let functions = vec![
            FunctionSource {
                name: "execute".into(),
                source: "run();".into(),
            },
            FunctionSource {
                name: "set_up".into(),
                source: "init();\n".into(),
            },
        ];
        let unit = SectionAssembler.assemble("job-1", &functions).unwrap();
        assert!(unit.starts_with("// unit job-1\n"));
        assert!(unit.contains("// === execute ===\nrun();\n"));
        assert!(unit.contains("// === set_up ===\ninit();\n"));
    }

    #[test]
    fn deterministic_for_same_input() {
        let functions = vec![FunctionSource {
            name: "execute".into(),
            source: "x".into(),
        }];
        assert_eq!(
            SectionAssembler.assemble("j", &functions).unwrap(),
            SectionAssembler.assemble("j", &functions).unwrap()
        );
    }

    #[test]
    fn empty_function_list_still_assembles() {
        let unit = SectionAssembler.assemble("job-9", &[]).unwrap();
        assert_eq!(unit, "// unit job-9\n");
    }
}
