//! Local key material: raw keys and BIP-39 derivation for both families.

use crate::config::LocalKeyConfig;
use crate::errors::{WalletError, WalletResult};
use alloy::signers::local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner};
use bip39::{Language, Mnemonic};
use secrecy::{ExposeSecret as _, SecretString};
use solana_derivation_path::DerivationPath as SolanaDerivationPath;
use solana_keypair::seed_derivable::keypair_from_seed_and_derivation_path;
use solana_keypair::Keypair;
use solana_seed_phrase::generate_seed_from_seed_phrase_and_passphrase;
use zeroize::Zeroizing;

fn validated_phrase(phrase: &SecretString) -> WalletResult<Zeroizing<String>> {
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase.expose_secret())
        .map_err(|e| WalletError::Configuration(format!("invalid mnemonic: {e}")))?;
    Ok(Zeroizing::new(mnemonic.to_string()))
}

pub fn evm_signer_from_hex(key: &SecretString) -> WalletResult<PrivateKeySigner> {
    let s = key.expose_secret().trim();
    let bytes = Zeroizing::new(
        hex::decode(s.strip_prefix("0x").unwrap_or(s))
            .map_err(|e| WalletError::Configuration(format!("evm private key is not hex: {e}")))?,
    );
    PrivateKeySigner::from_slice(&bytes)
        .map_err(|e| WalletError::Configuration(format!("invalid evm private key: {e}")))
}

/// Standard BIP-44 EVM path, `m/44'/60'/0'/0/{index}`.
pub fn evm_signer_from_mnemonic(phrase: &SecretString, index: u32) -> WalletResult<PrivateKeySigner> {
    let phrase = validated_phrase(phrase)?;
    MnemonicBuilder::<English>::default()
        .phrase(phrase.as_str())
        .index(index)
        .map_err(|e| WalletError::Configuration(format!("evm derivation index: {e}")))?
        .build()
        .map_err(|e| WalletError::Configuration(format!("derive evm key: {e}")))
}

pub fn solana_keypair_from_base58(key: &SecretString) -> WalletResult<Keypair> {
    let bytes = Zeroizing::new(
        bs58::decode(key.expose_secret().trim())
            .into_vec()
            .map_err(|e| WalletError::Configuration(format!("solana key is not base58: {e}")))?,
    );
    Keypair::try_from(bytes.as_slice())
        .map_err(|e| WalletError::Configuration(format!("invalid solana keypair bytes: {e}")))
}

/// `m/44'/501'/{index}'/0'`, the path most Solana wallets use.
pub fn solana_keypair_from_mnemonic(phrase: &SecretString, index: u32) -> WalletResult<Keypair> {
    let phrase = validated_phrase(phrase)?;
    let seed = Zeroizing::new(generate_seed_from_seed_phrase_and_passphrase(
        phrase.as_str(),
        "",
    ));
    let path = SolanaDerivationPath::new_bip44(Some(index), Some(0));
    keypair_from_seed_and_derivation_path(&seed, Some(path))
        .map_err(|e| WalletError::Configuration(format!("derive solana keypair: {e}")))
}

pub fn evm_signer(cfg: &LocalKeyConfig) -> WalletResult<PrivateKeySigner> {
    match (&cfg.private_key, &cfg.mnemonic) {
        (Some(k), _) => evm_signer_from_hex(k),
        (None, Some(m)) => evm_signer_from_mnemonic(m, cfg.account_index),
        (None, None) => Err(WalletError::Configuration(
            "local evm wallet needs PRIVATE_KEY or MNEMONIC_PHRASE".into(),
        )),
    }
}

pub fn solana_keypair(cfg: &LocalKeyConfig) -> WalletResult<Keypair> {
    match (&cfg.solana_private_key, &cfg.mnemonic) {
        (Some(k), _) => solana_keypair_from_base58(k),
        (None, Some(m)) => solana_keypair_from_mnemonic(m, cfg.account_index),
        (None, None) => Err(WalletError::Configuration(
            "local solana wallet needs SOLANA_PRIVATE_KEY or MNEMONIC_PHRASE".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret;
    use solana_signer::Signer as _;

    const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";

    #[test]
    fn evm_mnemonic_derivation_matches_well_known_accounts() -> eyre::Result<()> {
        let phrase = secret(TEST_MNEMONIC);
        let a0 = evm_signer_from_mnemonic(&phrase, 0)?;
        let a1 = evm_signer_from_mnemonic(&phrase, 1)?;
        assert_eq!(
            a0.address().to_checksum(None),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
        assert_eq!(
            a1.address().to_checksum(None),
            "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
        );
        Ok(())
    }

    #[test]
    fn hex_key_with_or_without_prefix() -> eyre::Result<()> {
        let k = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let a = evm_signer_from_hex(&secret(k))?;
        let b = evm_signer_from_hex(&secret(&format!("0x{k}")))?;
        assert_eq!(a.address(), b.address());
        assert_eq!(
            a.address().to_checksum(None),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
        Ok(())
    }

    #[test]
    fn solana_derivation_is_deterministic_per_index() -> eyre::Result<()> {
        let phrase = secret(TEST_MNEMONIC);
        let k0 = solana_keypair_from_mnemonic(&phrase, 0)?;
        let again = solana_keypair_from_mnemonic(&phrase, 0)?;
        let k1 = solana_keypair_from_mnemonic(&phrase, 1)?;
        assert_eq!(k0.pubkey(), again.pubkey());
        assert_ne!(k0.pubkey(), k1.pubkey());
        Ok(())
    }

    #[test]
    fn base58_keypair_round_trips() -> eyre::Result<()> {
        let kp = Keypair::new();
        let encoded = bs58::encode(kp.to_bytes()).into_string();
        let back = solana_keypair_from_base58(&secret(&encoded))?;
        assert_eq!(back.pubkey(), kp.pubkey());
        Ok(())
    }

    #[test]
    fn bad_material_is_a_configuration_error() {
        assert!(matches!(
            evm_signer_from_hex(&secret("zz")),
            Err(WalletError::Configuration(_))
        ));
        assert!(matches!(
            evm_signer_from_mnemonic(&secret("not a real phrase"), 0),
            Err(WalletError::Configuration(_))
        ));
        assert!(matches!(
            solana_keypair(&LocalKeyConfig::default()),
            Err(WalletError::Configuration(_))
        ));
    }
}
