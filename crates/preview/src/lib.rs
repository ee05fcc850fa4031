//! Live preview pipeline: entry selection, source rewriting, compilation,
//! document assembly and sandboxed loading.
//! 即時預覽管線：選擇進入點、改寫原始碼、編譯、組合文件並於沙箱中載入。

pub mod compile;
pub mod document;
pub mod entry;
pub mod pipeline;
pub mod rewrite;
pub mod sandbox;

pub use compile::{CompileError, CompiledScript, Compiler, StandaloneBabel};
pub use document::{assemble, script_string_literal, PreviewDocument, RuntimeAssets};
pub use entry::{collect_stylesheets, select_entry, EntryRules};
pub use pipeline::{PreviewConfig, PreviewError, PreviewPipeline, PreviewState, DEFAULT_LOAD_TIMEOUT};
pub use rewrite::{RegexRewriter, RewriteRule, SourceRewriter, APP_BINDING, REACT_HOOKS};
pub use sandbox::{ExecutionContext, ExecutionError, FileContext, RunTicket, SandboxPolicy};
