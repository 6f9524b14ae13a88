//! Cross-subsystem integration flows.

#[cfg(test)]
mod harness;
#[cfg(test)]
mod multisig_flow;
#[cfg(test)]
mod recovery;
#[cfg(test)]
mod release_flow;
