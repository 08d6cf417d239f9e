mod shell;

pub use shell::{execute_shell, ExecResult};
