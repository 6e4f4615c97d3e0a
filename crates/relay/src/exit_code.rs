/// Process exit codes, kept distinct so an operator's supervisor (systemd,
/// a shell wrapper) can tell these failure modes apart without parsing logs.
#[derive(Debug, Clone, Copy)]
pub enum ExitCode {
    Ok = 0,
    InitFailure = 101,
    NoPort = 102,
    NetworkInitFailure = 103,
    ListenBindFailure = 104,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}
