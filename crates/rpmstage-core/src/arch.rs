pub const MULTILIB_TRANSACTION_COLOR: u32 = 3;

pub fn is_multilib_arch(arch: &str) -> bool {
    matches!(arch, "x86_64" | "aarch64" | "ppc64" | "ppc64le" | "s390x")
}
