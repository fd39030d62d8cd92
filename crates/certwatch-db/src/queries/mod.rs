mod certificates;
mod identities;
mod profiles;
