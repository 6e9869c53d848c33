/// Shortens a wallet address to `abc...xyz` for display.
pub fn format_wallet_address(address: &str, start_chars: usize, end_chars: usize) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= start_chars + end_chars {
        return address.to_string();
    }
    let head: String = chars[..start_chars].iter().collect();
    let tail: String = chars[chars.len() - end_chars..].iter().collect();
    format!("{head}...{tail}")
}

pub fn short_address(address: &str) -> String {
    format_wallet_address(address, 3, 3)
}
