pub struct Icons;

impl Icons {
    pub const PACKAGE: &str = "📦";
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const CLOCK: &str = "⏱️";
    pub const GEAR: &str = "⚙️";
    pub const FINGERPRINT: &str = "🔑";
    pub const TARGET: &str = "🎯";
}
