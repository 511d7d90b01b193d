use crate::engine::Language;

/// Static description of how to find one language's analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolchainSpec {
    pub language: Language,
    /// Self-contained analyzer shipped next to the host executable
    pub native_binary: &'static str,
    /// Tool name used in the `<PREFIX>_<TOOL>_PATH` override
    pub tool: &'static str,
    /// Interpreters looked up on `PATH`, in order
    pub candidates: &'static [&'static str],
    /// Arguments for the interpreter liveness check (must exit 0)
    pub version_args: &'static [&'static str],
    /// Arguments placed between the interpreter and the script (`go run`)
    pub script_prefix: &'static [&'static str],
    /// Analyzer script run by the interpreter, relative to the analyzers dir
    pub script: &'static str,
    /// Per-language analyzer image
    pub docker_image: &'static str,
    pub install_hint: &'static str,
}

impl ToolchainSpec {
    pub const PYTHON: ToolchainSpec = ToolchainSpec {
        language: Language::Python,
        native_binary: "apigraph-python-analyzer",
        tool: "PYTHON",
        candidates: &["python3", "python"],
        version_args: &["--version"],
        script_prefix: &[],
        script: "extract_api.py",
        docker_image: "apigraph/python-analyzer:latest",
        install_hint: "Install Python 3.9+ (https://www.python.org/downloads/) or set APIGRAPH_PYTHON_PATH",
    };

    pub const GO: ToolchainSpec = ToolchainSpec {
        language: Language::Go,
        native_binary: "apigraph-go-analyzer",
        tool: "GO",
        candidates: &["go"],
        version_args: &["version"],
        script_prefix: &["run"],
        script: "extract_api.go",
        docker_image: "apigraph/go-analyzer:latest",
        install_hint: "Install Go 1.21+ (https://go.dev/dl/) or set APIGRAPH_GO_PATH",
    };

    pub const JAVA: ToolchainSpec = ToolchainSpec {
        language: Language::Java,
        native_binary: "apigraph-java-analyzer",
        tool: "JBANG",
        candidates: &["jbang"],
        version_args: &["--version"],
        script_prefix: &[],
        script: "ExtractApi.java",
        docker_image: "apigraph/java-analyzer:latest",
        install_hint: "Install JBang (https://www.jbang.dev/download/) or set APIGRAPH_JBANG_PATH",
    };

    pub fn for_language(language: Language) -> &'static ToolchainSpec {
        match language {
            Language::Python => &Self::PYTHON,
            Language::Go => &Self::GO,
            Language::Java => &Self::JAVA,
        }
    }

    /// `<PREFIX>_<TOOL>_PATH`
    pub fn override_var(&self, prefix: &str) -> String {
        format!("{}_{}_PATH", prefix, self.tool)
    }

    pub fn native_file_name(&self) -> String {
        format!("{}{}", self.native_binary, std::env::consts::EXE_SUFFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_var() {
        assert_eq!(ToolchainSpec::PYTHON.override_var("APIGRAPH"), "APIGRAPH_PYTHON_PATH");
        assert_eq!(ToolchainSpec::JAVA.override_var("APIGRAPH"), "APIGRAPH_JBANG_PATH");
    }

    #[test]
    fn test_lookup_by_language() {
        for language in Language::all() {
            assert_eq!(ToolchainSpec::for_language(*language).language, *language);
        }
    }
}
