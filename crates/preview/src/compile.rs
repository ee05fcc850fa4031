use thiserror::Error;

use crate::document::script_string_literal;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("{file} has no source to compile")]
    EmptySource { file: String },
    #[error("{file} could not be compiled: {message}")]
    Rejected { file: String, message: String },
}

/// Output of a [`Compiler`]: script text run inside the preview guard plus
/// any runtime scripts the document must load first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledScript {
    pub body: String,
    pub runtime_scripts: Vec<String>,
}

/// Turns rewritten component source into script the preview document runs.
/// （將轉換後的元件原始碼編譯為預覽文件可執行的腳本。）
pub trait Compiler: Send + Sync {
    fn compile(&self, file_name: &str, source: &str) -> Result<CompiledScript, CompileError>;
}

/// Delegates JSX compilation to the standalone Babel build loaded in the
/// preview document; the source is embedded as a string literal and
/// transformed when the document runs.
/// （交由預覽文件中載入的 Babel standalone 進行 JSX 編譯。）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandaloneBabel {
    compiler_url: String,
}

impl StandaloneBabel {
    pub fn new(compiler_url: impl Into<String>) -> Self {
        Self {
            compiler_url: compiler_url.into(),
        }
    }

    pub fn compiler_url(&self) -> &str {
        &self.compiler_url
    }
}

impl Compiler for StandaloneBabel {
    fn compile(&self, file_name: &str, source: &str) -> Result<CompiledScript, CompileError> {
        if source.trim().is_empty() {
            return Err(CompileError::EmptySource {
                file: file_name.to_string(),
            });
        }
        let literal = script_string_literal(source);
        let body = format!(
            "var __source = {literal};\n\
             var __compiled = Babel.transform(__source, {{\n\
             \x20 presets: ['react'],\n\
             \x20 plugins: [['transform-modules-umd', {{ globals: {{ 'react': 'React', 'react-dom': 'ReactDOM' }} }}]]\n\
             }}).code;\n\
             eval(__compiled);"
        );
        Ok(CompiledScript {
            body,
            runtime_scripts: vec![self.compiler_url.clone()],
        })
    }
}
